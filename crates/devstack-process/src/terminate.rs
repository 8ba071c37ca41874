//! Process termination primitives.

use devstack_common::{ProcessError, ProcessResult};

/// Ask a process and its group to exit (SIGTERM on Unix, Ctrl+Break on Windows).
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(windows)]
    {
        crate::terminate_windows::send_ctrl_break(pid, std::time::Duration::from_secs(5))
            .map_err(|e| ProcessError::stop_failed(pid.to_string(), e))
    }
}

/// Force kill a process (SIGKILL to its group on Unix, TerminateProcess on Windows).
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                _ => {
                    return Err(ProcessError::stop_failed(
                        pid.to_string(),
                        "Failed to open process for termination",
                    ));
                }
            };

            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);

            result.map_err(|e| {
                ProcessError::stop_failed(pid.to_string(), format!("TerminateProcess failed: {}", e))
            })
        }
    }
}

/// Signal the process group led by `pid`, so background children of a
/// service go down with it. Falls back to the process alone when `pid`
/// does not lead a group.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> ProcessResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid as i32);
    match killpg(target, signal) {
        Err(Errno::ESRCH) => kill(target, signal),
        result => result,
    }
    .map_err(|e| ProcessError::stop_failed(pid.to_string(), e.to_string()))
}
