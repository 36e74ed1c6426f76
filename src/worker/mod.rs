//! Worker process main loop (C7, spec.md §4.7).

pub mod classify;
pub mod pipeline;

pub use classify::{Classifier, ClassificationResult, NoopClassifier};
pub use pipeline::Services;

use std::net::TcpListener;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{info, warn};

use crate::ipc;
use crate::signals::Signals;

const READY_TIMEOUT: Duration = Duration::from_secs(15);
const LISTENER_WAIT_TIMEOUT: Duration = Duration::from_secs(360);
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Why the loop in [`run`] ended, driving the worker's exit code
/// (spec.md §4.7: "exit code indicates whether the last ready was
/// delivered").
pub enum ExitReason {
    RequestLimitReached,
    ReloadRequested,
    ControlChannelLost,
}

impl ExitReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::RequestLimitReached | ExitReason::ReloadRequested => 0,
            ExitReason::ControlChannelLost => 1,
        }
    }
}

/// Runs the worker's request loop until `max_requests` connections
/// have been handled, a reload is requested, or the control channel
/// is lost. Assumes signals and privileges have already been set up
/// by the caller immediately after fork (spec.md §4.7's opening
/// sequence happens once, before this loop starts).
pub fn run(
    mut control: UnixStream,
    listeners: &[TcpListener],
    max_requests: u32,
    signals: &'static Signals,
    services: &Services,
) -> ExitReason {
    for request_num in 0..max_requests {
        if signals.take_full_reload() {
            return ExitReason::ReloadRequested;
        }

        if let Err(e) = ipc::send_ready(&mut control, READY_TIMEOUT) {
            warn!(error = %e, "failed to send ready token");
            return ExitReason::ControlChannelLost;
        }

        let listener_index = match ipc::recv_listener_index(&mut control, LISTENER_WAIT_TIMEOUT) {
            Ok(idx) => idx,
            Err(e) => {
                if signals.take_full_reload() {
                    return ExitReason::ReloadRequested;
                }
                warn!(error = %e, "failed to receive listener index");
                return ExitReason::ControlChannelLost;
            }
        };

        let Some(listener) = listeners.get(listener_index as usize) else {
            warn!(listener_index, "supervisor named an out-of-range listener");
            return ExitReason::ControlChannelLost;
        };

        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed after handoff");
                continue;
            }
        };

        if let Err(e) = ipc::send_ack(&mut control, ACK_TIMEOUT) {
            warn!(error = %e, "failed to send accept ack");
            return ExitReason::ControlChannelLost;
        }

        pipeline::handle_connection(stream, peer, services);
        info!(request_num, "request handled");
    }
    ExitReason::RequestLimitReached
}
