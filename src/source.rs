use std::io::{self, BufReader, Bytes, Read};
use std::str::Chars;

/// Anything the lexer can pull characters from, one at a time.
///
/// `None` is the end-of-input sentinel; once returned, every later call
/// returns `None` as well.
pub trait CharSource {
    fn next_char(&mut self) -> Option<char>;
}

impl<S: CharSource + ?Sized> CharSource for &mut S {
    fn next_char(&mut self) -> Option<char> {
        (**self).next_char()
    }
}

/// Cursor over an in-memory string.
#[derive(Debug, Clone)]
pub struct StrSource<'a> {
    chars: Chars<'a>,
}

impl<'a> StrSource<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars(),
        }
    }
}

impl<'a> CharSource for StrSource<'a> {
    fn next_char(&mut self) -> Option<char> {
        self.chars.next()
    }
}

/// Sequential reader over an already opened stream.
///
/// Bytes are taken as Latin-1, which matches the language's ASCII-only
/// lexical grammar. A read failure ends the input; the error is kept so the
/// caller can tell it apart from a clean end of file.
pub struct ReadSource<R: Read> {
    bytes: Bytes<BufReader<R>>,
    error: Option<io::Error>,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes(),
            error: None,
        }
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: Read> CharSource for ReadSource<R> {
    fn next_char(&mut self) -> Option<char> {
        if self.error.is_some() {
            return None;
        }
        match self.bytes.next()? {
            Ok(byte) => Some(byte as char),
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain(source: &mut impl CharSource) -> String {
        std::iter::from_fn(|| source.next_char()).collect()
    }

    #[test]
    fn str_source_yields_every_char_then_stops() {
        let mut source = StrSource::new("def f");
        assert_eq!(drain(&mut source), "def f");
        assert_eq!(source.next_char(), None);
        assert_eq!(source.next_char(), None);
    }

    #[test]
    fn read_source_reads_stream() {
        let mut source = ReadSource::new("extern sin(x)\n".as_bytes());
        assert_eq!(drain(&mut source), "extern sin(x)\n");
        assert!(source.error().is_none());
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn read_failure_ends_input_and_is_kept() {
        let mut source = ReadSource::new(Broken);
        assert_eq!(source.next_char(), None);
        assert_eq!(source.next_char(), None);
        let err = source.take_error().unwrap();
        assert_eq!(err.to_string(), "disk on fire");
    }
}
