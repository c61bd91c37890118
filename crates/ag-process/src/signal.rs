//! Thin wrappers around `libc::kill`. A missing process (already reaped) is
//! not an error here — every caller treats it the same as "nothing to do".

pub fn stop(pid: u32) {
    send(pid, libc::SIGSTOP);
}

pub fn cont(pid: u32) {
    send(pid, libc::SIGCONT);
}

pub fn term(pid: u32) {
    send(pid, libc::SIGTERM);
}

pub fn kill(pid: u32) {
    send(pid, libc::SIGKILL);
}

fn send(pid: u32, sig: libc::c_int) {
    unsafe {
        libc::kill(pid as libc::pid_t, sig);
    }
}
