//! Entry points called by compiled programs.

use {
    crate::{handle::Root, object::Obj},
    std::io::{self, Write},
};

/// Print an object to standard output.
///
/// Retains the object, resolves `stringify` through the outermost
/// segment, writes the resulting bytes verbatim, and flushes. No
/// trailing newline is written; programs emit their own line
/// terminators as string content. I/O failures are returned to the
/// caller.
pub fn print(obj: &Obj) -> io::Result<()>
{
    let guard = Root::of(obj);
    let text = guard.stringify();

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}

/// Elapsed process CPU time in milliseconds.
///
/// Monotonic within a run; has no meaning across processes.
pub fn clock_millis() -> i64
{
    // SAFETY: clock(3) has no preconditions.
    let ticks = unsafe { libc::clock() };
    ticks as i64 * 1000 / libc::CLOCKS_PER_SEC as i64
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::object::{Int, Segment, Str},
    };

    #[test]
    fn print_balances_counts()
    {
        let string = Str::new(b"printed\n");
        print(string.as_obj()).unwrap();
        assert_eq!(string.identity().count(), 1);

        let int = Int::new(3);
        print(int.as_obj()).unwrap();
        assert_eq!(int.identity().count(), 1);
    }

    #[test]
    fn clock_is_monotonic()
    {
        let earlier = clock_millis();
        let later = clock_millis();
        assert!(earlier >= 0);
        assert!(later >= earlier);
    }
}
