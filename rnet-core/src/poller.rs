//! Epoll-based readiness notifier.
//!
//! [`Poller`] owns one epoll instance and one `eventfd` used as a wake
//! channel: any thread may call [`Poller::trigger`] to schedule a closure
//! on the loop that owns this poller; if the async-work queue was empty,
//! the trigger writes to the wake fd so the blocked `epoll_wait` returns.
//!
//! # Safety
//!
//! This module is the one place in the crate that talks to the kernel
//! through raw `libc` calls (`epoll_create1`, `epoll_ctl`, `epoll_wait`,
//! `eventfd`, `read`, `write`, `close`). Every unsafe block is a single
//! syscall whose arguments are validated before the call and whose
//! return value is checked immediately after.

#![allow(unsafe_code)]

use std::os::unix::io::RawFd;

use crate::asyncwork::{Queue, Work};
use crate::error::{CoreError, Result};

const INITIAL_EVENTS_CAP: usize = 128;

/// Readiness bits a caller may register interest in or receive back.
pub mod interest {
    pub const READ: u32 = libc::EPOLLIN as u32 | libc::EPOLLPRI as u32;
    pub const WRITE: u32 = libc::EPOLLOUT as u32;
    pub const READ_WRITE: u32 = READ | WRITE;
}

/// Wraps one epoll instance, its wake fd, and the queue that feeds it.
pub struct Poller {
    epoll_fd: RawFd,
    wake_fd: RawFd,
    queue: Queue,
}

impl Poller {
    /// Create a new epoll instance with its wake fd already registered.
    pub fn new() -> Result<Self> {
        let epoll_fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        let wake_fd = cvt(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })?;

        let poller = Self {
            epoll_fd,
            wake_fd,
            queue: Queue::new(),
        };
        poller.ctl(libc::EPOLL_CTL_ADD, wake_fd, interest::READ)?;
        Ok(poller)
    }

    /// Register `fd` for read readiness (`EPOLLIN | EPOLLPRI`).
    pub fn add_read(&self, fd: RawFd) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest::READ)
    }

    /// Register `fd` for write readiness only.
    pub fn add_write(&self, fd: RawFd) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest::WRITE)
    }

    /// Switch an already-registered `fd` to read+write interest.
    pub fn mod_read_write(&self, fd: RawFd) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest::READ_WRITE)
    }

    /// Switch an already-registered `fd` back to read-only interest.
    pub fn mod_read(&self, fd: RawFd) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest::READ)
    }

    /// Remove `fd` from this epoll set.
    pub fn delete(&self, fd: RawFd) -> Result<()> {
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        cvt(unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, &mut ev) }).map(drop)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> Result<()> {
        let mut ev = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        cvt(unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut ev) }).map(drop)
    }

    /// Enqueue `work` on this loop's thread. If the queue was empty before
    /// this push, wake the blocked `epoll_wait` by writing to the wake fd.
    pub fn trigger(&self, work: Work) -> Result<()> {
        if self.queue.push(work) {
            self.wake_now()?;
        }
        Ok(())
    }

    fn wake_now(&self) -> Result<()> {
        // Little-endian encoding of 1u64, written as literal bytes so the
        // wake protocol does not depend on host byte order.
        let one: [u8; 8] = [1, 0, 0, 0, 0, 0, 0, 0];
        let n = unsafe {
            libc::write(
                self.wake_fd,
                one.as_ptr().cast::<libc::c_void>(),
                one.len(),
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            // EAGAIN means the eventfd counter is already saturated/pending
            // a drain; either way a wake is already in flight.
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(CoreError::Io(err));
        }
        Ok(())
    }

    fn drain_wake_fd(&self) {
        let mut buf = [0u8; 8];
        loop {
            let n = unsafe {
                libc::read(self.wake_fd, buf.as_mut_ptr().cast::<libc::c_void>(), 8)
            };
            if n < 0 {
                break;
            }
        }
    }

    /// Block in `epoll_wait` forever, dispatching ready events to
    /// `callback(fd, events)` in kernel-delivery order. Drains the
    /// async-work queue after each batch that included a wake. Returns
    /// when `callback` or a triggered closure returns an error (including
    /// the shutdown sentinel).
    pub fn polling<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(RawFd, u32) -> Result<()>,
    {
        let mut events: Vec<libc::epoll_event> = vec![empty_event(); INITIAL_EVENTS_CAP];

        loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.epoll_fd,
                    events.as_mut_ptr(),
                    events.len() as libc::c_int,
                    -1,
                )
            };

            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::warn!(error = %err, "epoll_wait failed, retrying");
                continue;
            }

            let mut waken = false;
            for ev in &events[..n as usize] {
                let fd = ev.u64 as RawFd;
                if fd == self.wake_fd {
                    waken = true;
                    continue;
                }
                if let Err(e) = callback(fd, ev.events) {
                    if e.is_shutdown() {
                        return Ok(());
                    }
                    return Err(e);
                }
            }

            if waken {
                self.drain_wake_fd();
                for work in self.queue.drain() {
                    if let Err(e) = work() {
                        if e.is_shutdown() {
                            return Ok(());
                        }
                        return Err(e);
                    }
                }
            }

            if n as usize == events.len() {
                let new_len = events.len() * 2;
                events.resize(new_len, empty_event());
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_fd);
            libc::close(self.epoll_fd);
        }
    }
}

fn empty_event() -> libc::epoll_event {
    libc::epoll_event { events: 0, u64: 0 }
}

fn cvt(ret: libc::c_int) -> Result<RawFd> {
    if ret < 0 {
        Err(CoreError::Io(std::io::Error::last_os_error()))
    } else {
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn trigger_wakes_polling_thread() {
        let poller = Arc::new(Poller::new().unwrap());
        let ran = Arc::new(AtomicBool::new(false));

        let poller_thread = poller.clone();
        let ran_thread = ran.clone();
        let handle = thread::spawn(move || {
            poller_thread
                .polling(|_fd, _events| Ok(()))
                .unwrap();
            ran_thread.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        poller
            .trigger(Box::new(|| Err(CoreError::Shutdown)))
            .unwrap();

        handle.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
