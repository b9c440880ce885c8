//! Transaction brackets.
//!
//! The programmer drops into an unresponsive state when a multi-step
//! operation idles between commands, so every operation runs inside a
//! begin/end bracket. [`Transaction`] is the bracket as a guard: it derefs to
//! the programmer, nests by opening a guard on a guard, and always sends the
//! closing command, on error paths from `Drop`.

use std::ops::{Deref, DerefMut};
use tracing::{trace, warn};

use crate::error::Result;
use crate::programmer::Programmer;

pub struct Transaction<'a, P: Programmer + ?Sized> {
    programmer: &'a mut P,
}

impl<'a, P: Programmer + ?Sized> Transaction<'a, P> {
    /// Open a bracket on `programmer`.
    pub fn begin(programmer: &'a mut P) -> Result<Self> {
        programmer.begin_transaction()?;
        trace!("Transaction begin");
        Ok(Self { programmer })
    }

    /// Open a bracket nested inside this one.
    pub fn nested(&mut self) -> Result<Transaction<'_, P>> {
        Transaction::begin(&mut *self.programmer)
    }

    /// Close the bracket, reporting a failure to do so.
    pub fn end(self) -> Result<()> {
        let mut this = std::mem::ManuallyDrop::new(self);
        trace!("Transaction end");
        this.programmer.end_transaction()
    }
}

impl<P: Programmer + ?Sized> Deref for Transaction<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.programmer
    }
}

impl<P: Programmer + ?Sized> DerefMut for Transaction<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        self.programmer
    }
}

impl<P: Programmer + ?Sized> Drop for Transaction<'_, P> {
    fn drop(&mut self) {
        trace!("Transaction end (unwinding)");
        if let Err(e) = self.programmer.end_transaction() {
            warn!(error = %e, "Failed to end transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::sample_device;
    use crate::error::ProgError;
    use crate::programmer::{Command, MockProgrammer};

    #[test]
    fn test_nested_brackets() {
        let mut mock = MockProgrammer::for_device(&sample_device());
        {
            let mut outer = Transaction::begin(&mut mock).unwrap();
            let mut inner = outer.nested().unwrap();
            inner.get_status().unwrap();
            inner.end().unwrap();
            outer.end().unwrap();
        }
        assert_eq!(
            mock.log(),
            &[Command::Begin, Command::Begin, Command::GetStatus, Command::End, Command::End]
        );
        assert_eq!(mock.max_depth(), 2);
        assert_eq!(mock.open_brackets(), 0);
    }

    #[test]
    fn test_bracket_closed_on_error() {
        let mut mock = MockProgrammer::for_device(&sample_device())
            .fail_when(|c| matches!(c, Command::ProtectOff));

        let result: Result<()> = (|| {
            let mut txn = Transaction::begin(&mut mock)?;
            txn.protect_off()?;
            txn.end()
        })();

        assert!(matches!(result, Err(ProgError::Transport(_))));
        assert_eq!(mock.open_brackets(), 0);
        assert_eq!(mock.log().last(), Some(&Command::End));
    }

    #[test]
    fn test_failed_end_is_reported() {
        let mut mock = MockProgrammer::for_device(&sample_device())
            .fail_when(|c| matches!(c, Command::End));
        let txn = Transaction::begin(&mut mock).unwrap();
        assert!(txn.end().is_err());
        assert_eq!(mock.count(|c| matches!(c, Command::End)), 1);
    }
}
