use std::io::{self, BufRead, Write};
use thermo_core::CommandError;
use tracing::warn;

/// Ask for a value on `output` until `parse` accepts a line from `input`.
/// End of input is an error: there is nobody left to answer.
pub fn ask<T, R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    parse: impl Fn(&str) -> Result<T, CommandError>,
) -> io::Result<T> {
    let mut line = Vec::new();
    loop {
        write!(output, "{question}: ")?;
        output.flush()?;

        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no answer for '{question}'"),
            ));
        }
        let answer = std::str::from_utf8(&line).map_err(|_| CommandError::NotText);
        match answer.and_then(&parse) {
            Ok(value) => return Ok(value),
            Err(e) => warn!(error = %e, "Invalid startup value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use thermo_core::command::{parse_interval, parse_temperature};

    #[test]
    fn retries_until_valid() {
        let mut input = Cursor::new("abc\n-1\n5\n");
        let mut output = Vec::new();
        let interval = ask(&mut input, &mut output, "Interval (s)", parse_interval).unwrap();
        assert_eq!(interval, 5);
        assert_eq!(
            String::from_utf8(output).unwrap().matches("Interval (s): ").count(),
            3
        );
    }

    #[test]
    fn non_utf8_answer_is_asked_again() {
        let mut input = Cursor::new(b"\xff\xfe\n21.5\n".to_vec());
        let mut output = Vec::new();
        let target = ask(&mut input, &mut output, "Target (C)", parse_temperature).unwrap();
        assert_eq!(target, 21.5);
        assert_eq!(
            String::from_utf8(output).unwrap().matches("Target (C): ").count(),
            2
        );
    }

    #[test]
    fn end_of_input_is_an_error() {
        let mut input = Cursor::new("");
        let err = ask(&mut input, &mut io::sink(), "Target (C)", parse_temperature).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn leaves_following_lines_for_the_console() {
        let mut input = Cursor::new("21.5\nstop\n");
        let target = ask(&mut input, &mut io::sink(), "Target (C)", parse_temperature).unwrap();
        assert_eq!(target, 21.5);
        let mut rest = String::new();
        input.read_line(&mut rest).unwrap();
        assert_eq!(rest, "stop\n");
    }
}
