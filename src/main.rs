use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use tessera_client::{Client, ClientConfig, Transport};
use tessera_cloud::{Account, Application, NewRun, PollingOptions, RunInput};

/// Tessera - submit and inspect runs of cloud decision applications
#[derive(Parser)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
struct Cli {
  /// API key (default: TESSERA_API_KEY, then the config file)
  #[arg(long, global = true)]
  api_key: Option<String>,

  /// Named profile in the config file
  #[arg(long, global = true)]
  profile: Option<String>,

  /// Path to the config file (default: ~/.tessera/config.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Base URL of the API
  #[arg(long, global = true)]
  url: Option<String>,

  /// Log level when RUST_LOG is unset
  #[arg(long, global = true, default_value = "warn")]
  log_level: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Work with the runs of an application
  Run {
    #[command(subcommand)]
    action: RunAction,
  },

  /// Show the account's run queue
  Queue,
}

#[derive(Args)]
struct RunRef {
  /// Application ID
  #[arg(long)]
  app: String,

  /// Run ID
  run_id: String,
}

#[derive(Subcommand)]
enum RunAction {
  /// Submit a run, reading its input from stdin
  Submit {
    /// Application ID
    #[arg(long)]
    app: String,

    /// Application instance
    #[arg(long)]
    instance: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Run option as key=value; repeatable
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Send stdin as text instead of parsing it as JSON
    #[arg(long)]
    text: bool,

    /// Poll until the run finishes and print its result
    #[arg(long)]
    wait: bool,
  },

  /// Print a run's result
  #[command(name = "result")]
  Fetch {
    #[command(flatten)]
    run: RunRef,

    /// Poll until the run finishes
    #[arg(long)]
    wait: bool,

    /// Give up polling after this many seconds
    #[arg(long, default_value_t = 300)]
    max_duration: u64,
  },

  /// Print a run's metadata
  Metadata {
    #[command(flatten)]
    run: RunRef,
  },

  /// Print the input a run was submitted with
  Input {
    #[command(flatten)]
    run: RunRef,
  },

  /// Print a run's logs
  Logs {
    #[command(flatten)]
    run: RunRef,
  },

  /// Request cancellation of a run
  Cancel {
    #[command(flatten)]
    run: RunRef,
  },
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
  match raw.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected key=value, got '{}'", raw)),
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  tessera_log::init(&cli.log_level);

  let Some(command) = cli.command else {
    println!("tessera - use --help to see available commands");
    return Ok(());
  };

  let config = ClientConfig {
    api_key: cli.api_key,
    profile: cli.profile,
    config_path: cli.config,
    url: cli.url,
    ..Default::default()
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let client = Client::new(config).context("failed to create API client")?;
    let transport: Arc<dyn Transport> = Arc::new(client);

    match command {
      Commands::Run { action } => run_action(transport, action).await,
      Commands::Queue => {
        let queue = Account::new(transport).queue().await?;
        print_json(&queue)
      }
    }
  })
}

async fn run_action(transport: Arc<dyn Transport>, action: RunAction) -> Result<()> {
  match action {
    RunAction::Submit {
      app,
      instance,
      name,
      description,
      options,
      text,
      wait,
    } => {
      let input = read_input_from_stdin(text)?;
      let mut run = NewRun {
        input: Some(input),
        instance_id: instance,
        name,
        description,
        ..Default::default()
      };
      run.options.extend(options);

      let app = Application::new(transport, app);
      if wait {
        let result = app
          .new_run_with_result(run, &PollingOptions::default())
          .await
          .context("run did not finish")?;
        print_json(&result)
      } else {
        let run_id = app.new_run(run).await.context("failed to submit run")?;
        print_json(&serde_json::json!({ "run_id": run_id }))
      }
    }
    RunAction::Fetch {
      run,
      wait,
      max_duration,
    } => {
      let app = Application::new(transport, run.app);
      let result = if wait {
        let polling = PollingOptions {
          max_duration: Duration::from_secs(max_duration),
          ..Default::default()
        };
        app.run_result_with_polling(&run.run_id, &polling).await?
      } else {
        app.run_result(&run.run_id).await?
      };
      print_json(&result)
    }
    RunAction::Metadata { run } => {
      let app = Application::new(transport, run.app);
      print_json(&app.run_metadata(&run.run_id).await?)
    }
    RunAction::Input { run } => {
      let app = Application::new(transport, run.app);
      match app.run_input(&run.run_id).await? {
        RunInput::Json(value) => print_json(&value),
        RunInput::Text(text) => {
          print!("{}", text);
          Ok(())
        }
      }
    }
    RunAction::Logs { run } => {
      let app = Application::new(transport, run.app);
      let logs = app.run_logs(&run.run_id).await?;
      print!("{}", logs.log);
      Ok(())
    }
    RunAction::Cancel { run } => {
      let app = Application::new(transport, run.app);
      app.cancel_run(&run.run_id).await?;
      eprintln!("Cancellation requested for run {}", run.run_id);
      Ok(())
    }
  }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn read_input_from_stdin(text: bool) -> Result<RunInput> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    bail!("run input must be piped on stdin");
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read run input from stdin")?;

  if text {
    return Ok(RunInput::Text(input));
  }
  let value: Value = serde_json::from_str(&input).context("failed to parse run input JSON")?;
  Ok(RunInput::Json(value))
}
