//! Command-line argument parsing.
//!
//! Usage:
//!   hexicript [-d] [-s] [-f[<config>]] [-p<player>] [-c<code>] [-e<event>]… [-x<command>]… [<path>…]
//!
//! Paths may be script files or directories; directories contribute every
//! file with the configured script extension.

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which config file to load.
    pub config: ConfigFile,
    /// Inline code to run after loading (`-c<code>`).
    pub code: Option<String>,
    /// Acting entity for inline code, events and commands (`-p<player>`).
    pub player: Option<String>,
    /// Events to dispatch after loading, in order (`-e<event>`).
    pub events: Vec<String>,
    /// Command lines to dispatch after the events (`-x<command>`).
    pub commands: Vec<String>,
    /// Print per-script summaries before exiting (`-s`).
    pub summary: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Script files and directories.
    pub paths: Vec<PathBuf>,
}

/// How to choose the engine config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Search `./hexicript.conf`, then the platform config directory.
    #[default]
    Search,
    /// `-f` with no file argument: built-in defaults only.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

pub const USAGE: &str =
    "Usage: hexicript [-d] [-s] [-f[<config>]] [-p<player>] [-c<code>] [-e<event>]... [-x<command>]... [<path>...]";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.paths.extend(argv[i + 1..].iter().map(PathBuf::from));
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            args.paths.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        let flags = &arg[1..];
        for (pos, flag) in flags.char_indices() {
            let attached = &flags[pos + flag.len_utf8()..];
            match flag {
                'd' => args.debug = true,
                's' => args.summary = true,
                'f' => {
                    args.config = if !attached.is_empty() {
                        ConfigFile::Explicit(PathBuf::from(attached))
                    } else if argv.get(i + 1).is_some_and(|next| !next.starts_with('-')) {
                        i += 1;
                        ConfigFile::Explicit(PathBuf::from(&argv[i]))
                    } else {
                        ConfigFile::Skip
                    };
                    break;
                }
                'c' => {
                    args.code = Some(option_value(flag, attached, argv, &mut i)?);
                    break;
                }
                'p' => {
                    args.player = Some(option_value(flag, attached, argv, &mut i)?);
                    break;
                }
                'e' => {
                    args.events.push(option_value(flag, attached, argv, &mut i)?);
                    break;
                }
                'x' => {
                    args.commands.push(option_value(flag, attached, argv, &mut i)?);
                    break;
                }
                c => return Err(format!("unknown option: -{c}")),
            }
        }
        i += 1;
    }

    Ok(args)
}

/// The value of a value-taking flag: the rest of the current argument, or
/// the next argument.
fn option_value(flag: char, attached: &str, argv: &[String], i: &mut usize) -> Result<String, String> {
    if !attached.is_empty() {
        return Ok(attached.to_owned());
    }
    match argv.get(*i + 1) {
        Some(next) => {
            *i += 1;
            Ok(next.clone())
        }
        None => Err(format!("-{flag} requires an argument")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
