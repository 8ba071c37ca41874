//! Windows graceful termination.
//!
//! Children are spawned with `CREATE_NEW_PROCESS_GROUP`, so a Ctrl+Break
//! event addressed to the child's PID reaches only that group.

use std::sync::Mutex;
use std::time::Duration;
use windows::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

/// Console control events are process-global; serialize them.
static CONSOLE_OPERATION_LOCK: Mutex<()> = Mutex::new(());

/// Send Ctrl+Break to the process group rooted at `pid`, giving up after `timeout`.
pub fn send_ctrl_break(pid: u32, timeout: Duration) -> Result<(), String> {
    if pid == 0 {
        return Err(format!("Invalid PID: {}", pid));
    }

    let _lock = CONSOLE_OPERATION_LOCK
        .lock()
        .map_err(|e| format!("Failed to acquire console lock: {}", e))?;

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) }
            .map_err(|e| e.to_string());
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("Failed to send Ctrl+Break to PID {}: {}", pid, e)),
        Err(_) => Err(format!(
            "Timeout sending Ctrl+Break to PID {} after {:?}",
            pid, timeout
        )),
    }
}
