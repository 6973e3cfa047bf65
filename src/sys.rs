// smbfs-core is a library exposing a remote SMB share as a handle-oriented,
// async filesystem.
// Copyright (c) 2016 Konstantin Gribov
//
// This file is part of smbfs-core.
//
// smbfs-core is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// smbfs-core is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with smbfs-core. If not, see <http://www.gnu.org/licenses/>.

//! Raw `libsmbclient` (`smbclient-sys`) bindings.
//!
//! Everything `unsafe` lives here. Every public function is called from the
//! Driver thread only (`driver.rs`); `SMBCCTX` is not `Send`/`Sync` and
//! callers elsewhere must never touch it directly.

use std::ffi::{CString, c_void};
use std::mem;
use std::os::raw::{c_char, c_int};
use std::ptr;

use libc::{mode_t, off_t};
use smbclient_sys::*;

use crate::endpoint::AuthMode;
use crate::error::{Error, Result};

const SMBC_TRUE: smbc_bool = 1;

pub struct RawStat {
    pub size: u64,
    pub is_dir: bool,
    pub mtime_ms: i64,
    pub atime_ms: i64,
    pub ctime_ms: i64,
}

pub struct RawDirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Allocates and connects a new `SMBCCTX` for `auth`. Blocking: must run on
/// the Driver thread that will own this context.
pub fn new_context(auth: &AuthMode) -> Result<*mut SMBCCTX> {
    unsafe {
        let ctx = smbc_new_context();
        if ctx.is_null() {
            return Err(Error::ConnectFailed("smbc_new_context failed".into()));
        }

        let boxed = Box::new(auth.clone());
        smbc_setOptionUserData(ctx, Box::into_raw(boxed) as *mut c_void);
        smbc_setFunctionAuthDataWithContext(ctx, Some(auth_wrapper));
        smbc_setOptionOneSharePerServer(ctx, SMBC_TRUE);

        let initialized = smbc_init_context(ctx);
        if initialized.is_null() {
            // context was never exposed to a caller; free the user-data box
            // we just leaked into it before surfacing the error.
            let data = smbc_getOptionUserData(ctx);
            if !data.is_null() {
                drop(Box::from_raw(data as *mut AuthMode));
            }
            smbc_free_context(ctx, 0);
            return Err(Error::ConnectFailed(
                "smbc_init_context failed".into(),
            ));
        }
        Ok(initialized)
    }
}

pub fn destroy_context(ctx: *mut SMBCCTX) {
    unsafe {
        let data = smbc_getOptionUserData(ctx);
        if !data.is_null() {
            drop(Box::from_raw(data as *mut AuthMode));
        }
        smbc_free_context(ctx, 1 as c_int);
    }
}

extern "C" fn auth_wrapper(
    ctx: *mut SMBCCTX,
    _srv: *const c_char,
    _shr: *const c_char,
    wg: *mut c_char,
    wglen: c_int,
    un: *mut c_char,
    unlen: c_int,
    pw: *mut c_char,
    pwlen: c_int,
) {
    unsafe {
        let data = smbc_getOptionUserData(ctx);
        if data.is_null() {
            return;
        }
        let auth = &*(data as *const AuthMode);
        let (domain, user, password) = match auth {
            AuthMode::Anonymous => (String::new(), "guest".to_owned(), String::new()),
            AuthMode::Ntlm { domain, user, password } => {
                (domain.clone(), user.clone(), password.clone())
            }
            AuthMode::Krb5Cc { domain, user, .. } => (domain.clone(), user.clone(), String::new()),
        };
        write_to_cstr(wg as *mut u8, wglen as usize, &domain);
        write_to_cstr(un as *mut u8, unlen as usize, &user);
        write_to_cstr(pw as *mut u8, pwlen as usize, &password);
    }
}

fn write_to_cstr(dst: *mut u8, len: usize, value: &str) {
    if len == 0 {
        return;
    }
    let bytes = value.as_bytes();
    let n = bytes.len().min(len - 1);
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), dst, n);
        *dst.add(n) = 0;
    }
}

fn check(ret: c_int) -> Result<c_int> {
    if ret < 0 {
        Err(Error::from_errno("smbclient", std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
    } else {
        Ok(ret)
    }
}

fn cpath(path: &str) -> Result<CString> {
    Ok(CString::new(path)?)
}

pub fn open(
    ctx: *mut SMBCCTX,
    path: &str,
    flags: c_int,
    mode: mode_t,
) -> Result<*mut SMBCFILE> {
    unsafe {
        let open_fn = smbc_getFunctionOpen(ctx).ok_or_else(|| {
            Error::IoError("smbc_getFunctionOpen returned null".into())
        })?;
        let c = cpath(path)?;
        let fd = open_fn(ctx, c.as_ptr(), flags, mode);
        if fd.is_null() {
            return Err(Error::from_errno(path, std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)));
        }
        Ok(fd)
    }
}

pub fn close(ctx: *mut SMBCCTX, fd: *mut SMBCFILE) {
    unsafe {
        if let Some(close_fn) = smbc_getFunctionClose(ctx) {
            close_fn(ctx, fd);
        }
    }
}

pub fn pread(ctx: *mut SMBCCTX, fd: *mut SMBCFILE, buf: &mut [u8], offset: u64) -> Result<usize> {
    unsafe {
        let lseek_fn = smbc_getFunctionLseek(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionLseek returned null".into()))?;
        check(lseek_fn(ctx, fd, offset as off_t, libc::SEEK_SET) as c_int)?;

        let read_fn = smbc_getFunctionRead(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionRead returned null".into()))?;
        let n = check(read_fn(ctx, fd, buf.as_mut_ptr() as *mut c_void, buf.len() as _) as c_int)?;
        Ok(n as usize)
    }
}

pub fn pwrite(ctx: *mut SMBCCTX, fd: *mut SMBCFILE, buf: &[u8], offset: u64) -> Result<usize> {
    unsafe {
        let lseek_fn = smbc_getFunctionLseek(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionLseek returned null".into()))?;
        check(lseek_fn(ctx, fd, offset as off_t, libc::SEEK_SET) as c_int)?;

        let write_fn = smbc_getFunctionWrite(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionWrite returned null".into()))?;
        let n = check(write_fn(ctx, fd, buf.as_ptr() as *const c_void, buf.len() as _) as c_int)?;
        Ok(n as usize)
    }
}

pub fn ftruncate(ctx: *mut SMBCCTX, fd: *mut SMBCFILE, size: u64) -> Result<()> {
    unsafe {
        let ftruncate_fn = smbc_getFunctionFtruncate(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionFtruncate returned null".into()))?;
        check(ftruncate_fn(ctx, fd, size as off_t) as c_int)?;
        Ok(())
    }
}

/// `is_dir_hint` is the caller's expectation of what `path` names (a
/// `Handle`'s own `kind`), used only to pick `DirectoryNotFound` vs.
/// `FileNotFound` when the entry is missing — it does not affect the stat
/// call itself.
pub fn stat(ctx: *mut SMBCCTX, path: &str, is_dir_hint: bool) -> Result<RawStat> {
    unsafe {
        let stat_fn = smbc_getFunctionStat(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionStat returned null".into()))?;
        let c = cpath(path)?;
        let mut st: libc::stat = mem::zeroed();
        check(stat_fn(ctx, c.as_ptr(), &mut st as *mut libc::stat as *mut smbc_stat) as c_int)
            .map_err(|e| annotate_not_found(e, path, is_dir_hint))?;
        Ok(raw_stat_from_libc(&st))
    }
}

pub fn fstat(ctx: *mut SMBCCTX, fd: *mut SMBCFILE) -> Result<RawStat> {
    unsafe {
        let fstat_fn = smbc_getFunctionFstat(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionFstat returned null".into()))?;
        let mut st: libc::stat = mem::zeroed();
        check(fstat_fn(ctx, fd, &mut st as *mut libc::stat as *mut smbc_stat) as c_int)?;
        Ok(raw_stat_from_libc(&st))
    }
}

fn raw_stat_from_libc(st: &libc::stat) -> RawStat {
    RawStat {
        size: st.st_size as u64,
        is_dir: (st.st_mode & libc::S_IFMT) == libc::S_IFDIR,
        mtime_ms: st.st_mtime * 1000,
        atime_ms: st.st_atime * 1000,
        ctime_ms: st.st_ctime * 1000,
    }
}

fn annotate_not_found(err: Error, path: &str, is_dir_hint: bool) -> Error {
    match err {
        Error::EntryNotFound(_) if is_dir_hint => Error::DirectoryNotFound(path.to_owned()),
        Error::EntryNotFound(_) => Error::FileNotFound(path.to_owned()),
        other => other,
    }
}

pub fn mkdir(ctx: *mut SMBCCTX, path: &str, mode: mode_t) -> Result<()> {
    unsafe {
        let mkdir_fn = smbc_getFunctionMkdir(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionMkdir returned null".into()))?;
        let c = cpath(path)?;
        check(mkdir_fn(ctx, c.as_ptr(), mode) as c_int)?;
        Ok(())
    }
}

pub fn rmdir(ctx: *mut SMBCCTX, path: &str) -> Result<()> {
    unsafe {
        let rmdir_fn = smbc_getFunctionRmdir(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionRmdir returned null".into()))?;
        let c = cpath(path)?;
        check(rmdir_fn(ctx, c.as_ptr()) as c_int)
            .map_err(|e| annotate_not_found(e, path, true))?;
        Ok(())
    }
}

pub fn unlink(ctx: *mut SMBCCTX, path: &str) -> Result<()> {
    unsafe {
        let unlink_fn = smbc_getFunctionUnlink(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionUnlink returned null".into()))?;
        let c = cpath(path)?;
        check(unlink_fn(ctx, c.as_ptr()) as c_int)
            .map_err(|e| annotate_not_found(e, path, false))?;
        Ok(())
    }
}

pub fn opendir(ctx: *mut SMBCCTX, path: &str) -> Result<*mut SMBCFILE> {
    unsafe {
        let opendir_fn = smbc_getFunctionOpendir(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionOpendir returned null".into()))?;
        let c = cpath(path)?;
        let dh = opendir_fn(ctx, c.as_ptr());
        if dh.is_null() {
            return Err(annotate_not_found(
                Error::from_errno(path, std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)),
                path,
                true,
            ));
        }
        Ok(dh)
    }
}

pub fn closedir(ctx: *mut SMBCCTX, dh: *mut SMBCFILE) {
    unsafe {
        if let Some(closedir_fn) = smbc_getFunctionClosedir(ctx) {
            closedir_fn(ctx, dh);
        }
    }
}

/// Resets `errno` so a subsequent null return from `readdir` can be told
/// apart from a genuine error (POSIX `readdir` only sets `errno` on
/// failure; it never clears it on success).
fn clear_errno() {
    #[cfg(target_os = "linux")]
    unsafe {
        *libc::__errno_location() = 0;
    }
    #[cfg(target_os = "macos")]
    unsafe {
        *libc::__error() = 0;
    }
}

/// Reads a single directory entry, or `None` at end of stream. `.` and `..`
/// are filtered out here so every caller of `readdir` already sees the
/// client-visible view (§4.G).
pub fn readdir(ctx: *mut SMBCCTX, dh: *mut SMBCFILE) -> Result<Option<RawDirEntry>> {
    unsafe {
        let readdir_fn = smbc_getFunctionReaddir(ctx)
            .ok_or_else(|| Error::IoError("smbc_getFunctionReaddir returned null".into()))?;
        loop {
            clear_errno();
            let ent = readdir_fn(ctx, dh);
            if ent.is_null() {
                let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
                if errno != 0 {
                    return Err(Error::from_errno("readdir", errno));
                }
                return Ok(None);
            }
            let entry = &*ent;
            let name = std::ffi::CStr::from_ptr(entry.name.as_ptr())
                .to_string_lossy()
                .into_owned();
            if name == "." || name == ".." {
                continue;
            }
            let is_dir = entry.smbc_type == SMBC_DIR;
            return Ok(Some(RawDirEntry { name, is_dir }));
        }
    }
}
