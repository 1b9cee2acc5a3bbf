use crate::command::{Command, CommandError};
use std::io::BufRead;
use std::sync::mpsc::Sender;

pub const HELP: &str = "\
Commands:
  time <seconds>   set the sampling interval
  temp <celsius>   set the target temperature
  tout             toggle console echo of readings
  stop             stop the controller
";

/// Why the console worker returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Stopped,
    EndOfInput,
    /// The control loop dropped its receiver.
    LoopGone,
    ReadError,
}

/// Line-oriented operator console. Parsed commands are sent to the control
/// loop; nothing here touches the loop's parameters directly.
pub struct CommandConsole<R: BufRead> {
    input: R,
    commands: Sender<Command>,
}

impl<R: BufRead> CommandConsole<R> {
    pub fn new(input: R, commands: Sender<Command>) -> Self {
        Self { input, commands }
    }

    /// Read lines until `stop`, end of input, or the loop goes away.
    /// `observe` sees every accepted or rejected command; a line that is not
    /// UTF-8 is rejected like any other bad input.
    pub fn run(mut self, mut observe: impl FnMut(&Result<Command, CommandError>)) -> ConsoleExit {
        let mut line = Vec::new();
        loop {
            line.clear();
            match self.input.read_until(b'\n', &mut line) {
                Ok(0) => return ConsoleExit::EndOfInput,
                Ok(_) => {}
                Err(e) => {
                    log::error!("Console read failed: {}", e);
                    return ConsoleExit::ReadError;
                }
            }

            let text = std::str::from_utf8(&line).map_err(|_| CommandError::NotText);
            let parsed = match text.and_then(Command::parse) {
                Ok(None) => continue,
                Ok(Some(cmd)) => Ok(cmd),
                Err(e) => {
                    log::warn!("Rejected console input: {}", e);
                    Err(e)
                }
            };
            observe(&parsed);

            if let Ok(cmd) = parsed {
                if self.commands.send(cmd).is_err() {
                    return ConsoleExit::LoopGone;
                }
                if cmd == Command::Stop {
                    return ConsoleExit::Stopped;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;

    #[test]
    fn forwards_commands_until_stop() {
        let input = Cursor::new("time 5\n\nbogus\ntemp 21.5\ntout\nstop\ntime 9\n");
        let (tx, rx) = mpsc::channel();
        let mut rejected = 0;

        let exit = CommandConsole::new(input, tx).run(|res| {
            if res.is_err() {
                rejected += 1;
            }
        });

        assert_eq!(exit, ConsoleExit::Stopped);
        assert_eq!(rejected, 1);
        let sent: Vec<Command> = rx.try_iter().collect();
        assert_eq!(
            sent,
            vec![
                Command::SetInterval { seconds: 5 },
                Command::SetTarget { celsius: 21.5 },
                Command::ToggleEcho,
                Command::Stop,
            ]
        );
    }

    #[test]
    fn non_utf8_line_is_rejected_and_reading_continues() {
        let input = Cursor::new(b"tout\n\xff\xfe garbage\ntemp 21.5\nstop\n".to_vec());
        let (tx, rx) = mpsc::channel();
        let mut rejected = Vec::new();

        let exit = CommandConsole::new(input, tx).run(|res| {
            if let Err(e) = res {
                rejected.push(e.clone());
            }
        });

        assert_eq!(exit, ConsoleExit::Stopped);
        assert_eq!(rejected, vec![CommandError::NotText]);
        let sent: Vec<Command> = rx.try_iter().collect();
        assert_eq!(
            sent,
            vec![
                Command::ToggleEcho,
                Command::SetTarget { celsius: 21.5 },
                Command::Stop,
            ]
        );
    }

    #[test]
    fn invalid_values_are_not_forwarded() {
        let input = Cursor::new("time 0\ntemp abc\n");
        let (tx, rx) = mpsc::channel();
        let exit = CommandConsole::new(input, tx).run(|_| {});
        assert_eq!(exit, ConsoleExit::EndOfInput);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn exits_when_loop_is_gone() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let exit = CommandConsole::new(Cursor::new("tout\n"), tx).run(|_| {});
        assert_eq!(exit, ConsoleExit::LoopGone);
    }
}
