mod script;
mod session;

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::process;

use session::{Flow, Session};

fn main() -> io::Result<()> {
    let script = parse_script_arg().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: tracker-emulator [--script <file>]");
        process::exit(2);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new();

    for line in session.banner() {
        writeln!(writer, "{line}")?;
    }

    match script {
        Some(path) => {
            let reader = BufReader::new(File::open(&path)?);
            replay(reader, &mut session, &mut writer)
        }
        None => {
            let stdin = io::stdin();
            interactive(stdin.lock(), &mut session, &mut writer)
        }
    }
}

fn interactive(
    mut reader: impl BufRead,
    session: &mut Session,
    writer: &mut impl Write,
) -> io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if run_line(trimmed, session, writer)? == Flow::Quit {
            writeln!(writer, "Session closed.")?;
            break;
        }
    }
    Ok(())
}

/// Runs a directive file, echoing each line. `#` starts a comment.
fn replay(reader: impl BufRead, session: &mut Session, writer: &mut impl Write) -> io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        let directive = line.split('#').next().unwrap_or_default().trim();
        if directive.is_empty() {
            continue;
        }
        writeln!(writer, "> {directive}")?;
        if run_line(directive, session, writer)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn run_line(line: &str, session: &mut Session, writer: &mut impl Write) -> io::Result<Flow> {
    let mut responses = Vec::new();
    let flow = session.handle_line(line, &mut responses);
    for response in responses {
        writeln!(writer, "{response}")?;
    }
    Ok(flow)
}

fn parse_script_arg() -> Result<Option<String>, String> {
    let mut args = env::args().skip(1);
    let Some(arg) = args.next() else {
        return Ok(None);
    };
    if let Some(value) = arg.strip_prefix("--script=") {
        Ok(Some(value.to_owned()))
    } else if arg == "--script" {
        args.next()
            .map(Some)
            .ok_or_else(|| "Expected value after --script".to_owned())
    } else {
        Err(format!("Unknown argument `{arg}`"))
    }
}
