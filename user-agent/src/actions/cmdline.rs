// src/actions/cmdline.rs

//! Windows command line splitting and file discovery.
//!
//! Splitting follows the `CommandLineToArgvW` conventions: whitespace
//! separates arguments outside quotes, `2n` backslashes before a quote yield
//! `n` backslashes and toggle quoting, `2n+1` yield `n` backslashes and a
//! literal quote, and `""` inside quotes is a literal quote. The program name
//! (first argument) only honours quotes.

use std::path::Path;

pub fn argv_from_command_line(cmd: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut chars = cmd.trim_start().chars().peekable();

    // program name
    let mut program = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => break,
            _ => program.push(c),
        }
    }
    if program.is_empty() && chars.peek().is_none() && !cmd.contains('"') {
        return argv;
    }
    argv.push(program);

    loop {
        while chars.peek().is_some_and(|c| *c == ' ' || *c == '\t') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut arg = String::new();
        let mut in_quotes = false;
        let mut backslashes = 0usize;
        while let Some(&c) = chars.peek() {
            match c {
                '\\' => {
                    backslashes += 1;
                    chars.next();
                }
                '"' => {
                    arg.extend(std::iter::repeat_n('\\', backslashes / 2));
                    chars.next();
                    if backslashes % 2 == 1 {
                        arg.push('"');
                    } else if in_quotes && chars.peek() == Some(&'"') {
                        arg.push('"');
                        chars.next();
                    } else {
                        in_quotes = !in_quotes;
                    }
                    backslashes = 0;
                }
                ' ' | '\t' if !in_quotes => break,
                _ => {
                    arg.extend(std::iter::repeat_n('\\', backslashes));
                    backslashes = 0;
                    arg.push(c);
                    chars.next();
                }
            }
        }
        arg.extend(std::iter::repeat_n('\\', backslashes));
        argv.push(arg);
    }
    argv
}

/// Named pipe paths look like files but must never be opened by a dump.
pub fn is_pipe_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with(r"\\.\pipe\") || lower.starts_with(r"\\?\pipe\")
}

/// Regular, existing, non-pipe file.
pub fn is_dumpable_file(path: &str) -> bool {
    !path.is_empty() && !is_pipe_path(path) && Path::new(path).is_file()
}

/// Files referenced by a command line, as given and relative to `cwd`.
///
/// `skip_program` leaves out the program name, which is dumped separately
/// from the image path when the command line belongs to a tracked process.
pub fn files_from_command_line(cmd: &str, cwd: &str, skip_program: bool) -> Vec<String> {
    let argv = argv_from_command_line(cmd);
    let skip = usize::from(skip_program);
    let mut files = Vec::new();
    for arg in argv.iter().skip(skip) {
        if is_dumpable_file(arg) {
            files.push(arg.clone());
        }
        if !cwd.is_empty() && !arg.is_empty() {
            let rel = Path::new(cwd).join(arg).to_string_lossy().into_owned();
            if rel != *arg && is_dumpable_file(&rel) {
                files.push(rel);
            }
        }
    }
    files
}
