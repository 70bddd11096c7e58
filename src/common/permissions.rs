use std::path::Path;

/// Check if the current process runs with administrator rights.
///
/// On Windows this asks whether the process token belongs to the built-in
/// Administrators group.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    use windows_sys::Win32::Security::{
        CheckTokenMembership, CreateWellKnownSid, WinBuiltinAdministratorsSid,
        SECURITY_MAX_SID_SIZE,
    };

    unsafe {
        let mut sid = [0u8; SECURITY_MAX_SID_SIZE as usize];
        let mut sid_size: u32 = SECURITY_MAX_SID_SIZE;
        let sid_ptr = sid.as_mut_ptr() as *mut core::ffi::c_void;
        if CreateWellKnownSid(
            WinBuiltinAdministratorsSid,
            std::ptr::null_mut(),
            sid_ptr,
            &mut sid_size,
        ) == 0
        {
            return false;
        }
        let mut is_member: i32 = 0;
        if CheckTokenMembership(std::ptr::null_mut(), sid_ptr, &mut is_member) == 0 {
            return false;
        }
        is_member != 0
    }
}

/// Check if the current process runs as root (effective uid 0)
#[cfg(unix)]
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(any(windows, unix)))]
pub fn is_elevated() -> bool {
    false
}

/// Get a helpful message for permission issues
pub fn permission_hint(path: &Path) -> String {
    if cfg!(windows) {
        format!(
            "'{}' may be in use or owned by another account. Close Visual Studio Code and run from an elevated prompt.",
            path.display()
        )
    } else {
        format!(
            "Check file permissions for '{}'. You may need to run with sudo for system paths.",
            path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_check_does_not_panic() {
        let _ = is_elevated();
    }

    #[cfg(unix)]
    #[test]
    fn test_elevation_agrees_with_effective_uid() {
        let output = std::process::Command::new("id").arg("-u").output().unwrap();
        let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        assert_eq!(is_elevated(), uid == "0");
    }

    #[test]
    fn test_hint_names_the_path() {
        assert!(permission_hint(Path::new("/opt/code")).contains("/opt/code"));
    }
}
