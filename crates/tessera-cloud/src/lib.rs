//! Tessera Cloud
//!
//! Client-side view of remote runs. An [`Application`] submits runs, fetches
//! their metadata and results, and hides the large-payload protocol:
//!
//! ```text
//!   new_run(input > MAX_RUN_SIZE)          run_result(output > MAX_RUN_SIZE)
//!   ─────────────────────────────          ──────────────────────────────────
//!   POST {app}/runs/uploadurl              GET {app}/runs/{id}/metadata
//!   PUT  <upload_url>  (raw JSON)          GET {app}/runs/{id}?format=url
//!   POST {app}/runs    {upload_id}         GET <download url>
//! ```
//!
//! Polling ([`PollingOptions`]) and multi-run waiting ([`WaitOptions`]) are
//! built on the cheap metadata call. Everything goes through a
//! [`tessera_client::Transport`].

mod account;
mod application;
mod error;
mod polling;
mod run;
mod status;
mod wait;

pub use account::{Account, Queue, QueuedRun};
pub use application::{Application, DEFAULT_INSTANCE_ID, MAX_RUN_SIZE};
pub use error::CloudError;
pub use polling::{PollingOptions, poll};
pub use run::{
  DownloadUrl, ErrorLog, Metadata, NewRun, RunConfiguration, RunInformation, RunInput, RunLog,
  RunResult, UploadUrl, stringify_options,
};
pub use status::{Status, StatusV2};
pub use wait::WaitOptions;
