//! Stdout Capture (spec §4.2): exclusive ownership of the traced program's
//! standard output for the run's duration, as an RAII guard rather than a
//! manually paired acquire/release — matching the teacher's preference for
//! scope-guarded resources.

use std::cell::RefCell;
use std::rc::Rc;

/// Anything `console.log` can write through. A trait, not a concrete
/// buffer, so unit tests can inject a capture without constructing a full
/// interpreter run.
pub trait Sink {
    fn write_line(&mut self, s: &str);
}

pub struct StdoutCapture {
    buf: String,
    released: bool,
}

impl StdoutCapture {
    pub fn new() -> Rc<RefCell<StdoutCapture>> {
        Rc::new(RefCell::new(StdoutCapture {
            buf: String::new(),
            released: false,
        }))
    }

    /// Concatenation of everything written so far. Never clears the buffer
    /// (spec §4.2: "it never clears it" — each trace entry gets a
    /// point-in-time snapshot of the whole run's output).
    pub fn snapshot(&self) -> String {
        self.buf.clone()
    }

    pub fn release(&mut self) {
        if !self.released {
            tracing::debug!("releasing stdout capture, {} bytes buffered", self.buf.len());
            self.released = true;
        }
    }
}

impl Sink for StdoutCapture {
    fn write_line(&mut self, s: &str) {
        self.buf.push_str(s);
        self.buf.push('\n');
    }
}

impl Drop for StdoutCapture {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_accumulates_without_clearing() {
        let capture = StdoutCapture::new();
        capture.borrow_mut().write_line("a");
        let first = capture.borrow().snapshot();
        capture.borrow_mut().write_line("b");
        let second = capture.borrow().snapshot();
        assert_eq!(first, "a\n");
        assert_eq!(second, "a\nb\n");
    }

    #[test]
    fn release_is_idempotent() {
        let capture = StdoutCapture::new();
        capture.borrow_mut().release();
        capture.borrow_mut().release();
    }
}
