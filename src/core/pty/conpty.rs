//! ConPTY wrapper for Windows
//!
//! Runs a shell command line on a Windows pseudo console and exposes its
//! pipes as a [`PtyTransport`].

use std::io;

use tracing::debug;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Storage::FileSystem::{ReadFile, WriteFile};
use windows::Win32::System::Console::{
    ClosePseudoConsole, CreatePseudoConsole, ResizePseudoConsole, COORD, HPCON,
};
use windows::Win32::System::Pipes::{CreatePipe, PeekNamedPipe};
use windows::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, InitializeProcThreadAttributeList,
    TerminateProcess, UpdateProcThreadAttribute, WaitForSingleObject,
    EXTENDED_STARTUPINFO_PRESENT, LPPROC_THREAD_ATTRIBUTE_LIST, PROCESS_INFORMATION,
    STARTUPINFOEXW,
};

use super::{PtyError, PtyTransport, Result};

const PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE: usize = 0x00020016;

/// ConPTY handle wrapper
pub struct ConPty {
    hpc: HPCON,
    input_write: HANDLE,
    output_read: HANDLE,
    process: PROCESS_INFORMATION,
}

// Safety: the pseudo console and pipe handles are plain kernel handles.
// Reads only touch `output_read`, writes only `input_write`; both are safe
// to use from different threads at the same time.
unsafe impl Send for ConPty {}
unsafe impl Sync for ConPty {}

fn os_error(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0)
}

impl ConPty {
    /// Start `command_line` on a new pseudo console of the given size
    pub fn spawn(command_line: &str, cols: u16, rows: u16) -> Result<Self> {
        let spawn_error = |e: windows::core::Error| PtyError::Spawn {
            command: command_line.to_string(),
            message: e.message().to_string(),
        };
        unsafe { Self::create(command_line, cols, rows).map_err(spawn_error) }
    }

    unsafe fn create(
        command_line: &str,
        cols: u16,
        rows: u16,
    ) -> windows::core::Result<Self> {
        let mut pty_input_read = HANDLE::default();
        let mut pty_input_write = HANDLE::default();
        let mut pty_output_read = HANDLE::default();
        let mut pty_output_write = HANDLE::default();

        // Input pipe (we write, PTY reads)
        CreatePipe(&mut pty_input_read, &mut pty_input_write, None, 0)?;
        // Output pipe (PTY writes, we read)
        CreatePipe(&mut pty_output_read, &mut pty_output_write, None, 0)?;

        let size = COORD {
            X: cols as i16,
            Y: rows as i16,
        };
        let hpc = CreatePseudoConsole(size, pty_input_read, pty_output_write, 0)?;

        // The pseudo console owns its ends of the pipes now
        let _ = CloseHandle(pty_input_read);
        let _ = CloseHandle(pty_output_write);

        let mut attr_list_size: usize = 0;
        let _ = InitializeProcThreadAttributeList(
            LPPROC_THREAD_ATTRIBUTE_LIST::default(),
            1,
            0,
            &mut attr_list_size,
        );
        let mut attr_list_buffer = vec![0u8; attr_list_size];
        let attr_list = LPPROC_THREAD_ATTRIBUTE_LIST(attr_list_buffer.as_mut_ptr() as *mut _);

        let created = (|| -> windows::core::Result<PROCESS_INFORMATION> {
            InitializeProcThreadAttributeList(attr_list, 1, 0, &mut attr_list_size)?;
            UpdateProcThreadAttribute(
                attr_list,
                0,
                PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE,
                Some(hpc.0 as *const _),
                std::mem::size_of::<HPCON>(),
                None,
                None,
            )?;

            let mut startup_info = STARTUPINFOEXW {
                StartupInfo: std::mem::zeroed(),
                lpAttributeList: attr_list,
            };
            startup_info.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;

            let mut process_info = PROCESS_INFORMATION::default();
            let mut cmd_wide: Vec<u16> = command_line
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();

            CreateProcessW(
                PCWSTR::null(),
                PWSTR(cmd_wide.as_mut_ptr()),
                None,
                None,
                false,
                EXTENDED_STARTUPINFO_PRESENT,
                None,
                PCWSTR::null(),
                &startup_info.StartupInfo,
                &mut process_info,
            )?;
            DeleteProcThreadAttributeList(attr_list);
            Ok(process_info)
        })();

        match created {
            Ok(process) => {
                debug!("Spawned `{}` on ConPTY", command_line);
                Ok(ConPty {
                    hpc,
                    input_write: pty_input_write,
                    output_read: pty_output_read,
                    process,
                })
            }
            Err(e) => {
                ClosePseudoConsole(hpc);
                let _ = CloseHandle(pty_input_write);
                let _ = CloseHandle(pty_output_read);
                Err(e)
            }
        }
    }
}

impl PtyTransport for ConPty {
    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        let mut available: u32 = 0;

        unsafe {
            if PeekNamedPipe(self.output_read, None, 0, None, Some(&mut available), None).is_err() {
                return Err(PtyError::Read(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "Pipe closed",
                )));
            }
        }

        if available == 0 {
            return Ok(0);
        }

        let to_read = (available as usize).min(buf.len());
        let mut read: u32 = 0;
        unsafe {
            ReadFile(self.output_read, Some(&mut buf[..to_read]), Some(&mut read), None)
                .map_err(|e| PtyError::Read(os_error(e)))?;
        }
        Ok(read as usize)
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        let mut written: u32 = 0;
        unsafe {
            WriteFile(self.input_write, Some(data), Some(&mut written), None)
                .map_err(|e| PtyError::Write(os_error(e)))?;
        }
        Ok(written as usize)
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let size = COORD {
            X: cols as i16,
            Y: rows as i16,
        };
        unsafe { ResizePseudoConsole(self.hpc, size) }
            .map_err(|e| PtyError::Resize(e.message().to_string()))
    }

    fn is_running(&self) -> bool {
        // WAIT_OBJECT_0 (0) means the process handle is signaled, i.e. exited
        unsafe { WaitForSingleObject(self.process.hProcess, 0).0 != 0 }
    }

    fn close(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        unsafe { TerminateProcess(self.process.hProcess, 1) }
            .map_err(|e| PtyError::Close(e.message().to_string()))
    }
}

impl Drop for ConPty {
    fn drop(&mut self) {
        unsafe {
            ClosePseudoConsole(self.hpc);
            let _ = CloseHandle(self.input_write);
            let _ = CloseHandle(self.output_read);
            let _ = CloseHandle(self.process.hProcess);
            let _ = CloseHandle(self.process.hThread);
        }
    }
}
