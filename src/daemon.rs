//! Unix process management: session detachment, pid files, and
//! privilege dropping for servers started as root.

use std::ffi::CString;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Detach from the controlling terminal by starting a new session.
pub fn setsid() -> Result<()> {
    if unsafe { libc::setsid() } == -1 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

pub fn write_pid_file(path: &Path) -> Result<()> {
    fs::write(path, format!("{}\n", std::process::id()))?;
    Ok(())
}

fn lookup_uid(name: &str) -> Result<libc::uid_t> {
    let c_name =
        CString::new(name).map_err(|_| Error::Config(format!("bad user name: {name}")))?;
    let passwd = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if passwd.is_null() {
        return Err(Error::Config(format!("unknown user: {name}")));
    }
    Ok(unsafe { (*passwd).pw_uid })
}

fn lookup_gid(name: &str) -> Result<libc::gid_t> {
    let c_name =
        CString::new(name).map_err(|_| Error::Config(format!("bad group name: {name}")))?;
    let group = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if group.is_null() {
        return Err(Error::Config(format!("unknown group: {name}")));
    }
    Ok(unsafe { (*group).gr_gid })
}

/// Switch to the named group and user. The group change has to happen
/// first; after setuid the process can no longer change its gid.
pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<()> {
    if let Some(group) = group {
        let gid = lookup_gid(group)?;
        if unsafe { libc::setgid(gid) } != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
    }
    if let Some(user) = user {
        let uid = lookup_uid(user)?;
        if unsafe { libc::setuid(uid) } != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}
