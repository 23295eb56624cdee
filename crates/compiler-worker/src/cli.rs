//! Command-line interpretation.
//!
//! The orchestrator launches the worker as
//! `compiler-worker <executable> <compiler> --persistent_worker`; outside worker
//! mode every argument after the compiler is passed through to it untouched.
//! Arguments are therefore split by hand rather than through a declarative
//! parser: only the leading configuration flags are claimed by the worker, and
//! they are forwarded to `ortho_config` for layering.

use std::ffi::{OsStr, OsString};

use thiserror::Error;
use worker_config::CONFIG_CLI_FLAGS;

use crate::command::CompilerCommand;

/// Flag the orchestrator appends to request worker mode.
pub const PERSISTENT_WORKER_FLAG: &str = "--persistent_worker";

/// Invalid command lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// Worker mode takes exactly the executable and the compiler.
    #[error(
        "worker mode expects <executable> <compiler> --persistent_worker, \
         got {count} positional argument(s)"
    )]
    WorkerArity {
        /// Number of positional arguments supplied.
        count: usize,
    },
    /// Standalone mode needs at least the executable and the compiler.
    #[error("expected <executable> <compiler> [arguments...], got {count} argument(s)")]
    MissingCompiler {
        /// Number of positional arguments supplied.
        count: usize,
    },
}

/// The mode selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Serve framed requests from standard input.
    Worker(CompilerCommand),
    /// Run the compiler once with the given arguments.
    Standalone {
        /// Executable and compiler to run.
        command: CompilerCommand,
        /// Arguments forwarded to the compiler.
        arguments: Vec<OsString>,
    },
}

/// Result of splitting the process arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArguments {
    /// Program name followed by the configuration flags, for the loader.
    pub config_arguments: Vec<OsString>,
    /// Mode and compiler selected by the remaining arguments.
    pub invocation: Invocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

/// Splits the process arguments (including the program name) into
/// configuration flags and the selected [`Invocation`].
///
/// # Errors
///
/// Returns a [`UsageError`] when the positional arguments do not name an
/// executable and a compiler.
pub fn parse_invocation(args: &[OsString]) -> Result<ParsedArguments, UsageError> {
    let (config_arguments, remaining) = split_config_arguments(args);
    let persistent = remaining
        .iter()
        .any(|argument| argument == PERSISTENT_WORKER_FLAG);
    let positionals: Vec<OsString> = remaining
        .iter()
        .filter(|argument| *argument != PERSISTENT_WORKER_FLAG)
        .cloned()
        .collect();

    let count = positionals.len();
    let mut words = positionals.into_iter();
    let (Some(executable), Some(compiler)) = (words.next(), words.next()) else {
        return Err(if persistent {
            UsageError::WorkerArity { count }
        } else {
            UsageError::MissingCompiler { count }
        });
    };
    let command = CompilerCommand::new(executable, compiler);

    let invocation = if persistent {
        if count != 2 {
            return Err(UsageError::WorkerArity { count });
        }
        Invocation::Worker(command)
    } else {
        Invocation::Standalone {
            command,
            arguments: words.collect(),
        }
    };
    Ok(ParsedArguments {
        config_arguments,
        invocation,
    })
}

fn split_config_arguments(args: &[OsString]) -> (Vec<OsString>, &[OsString]) {
    let Some((program, mut remaining)) = args.split_first() else {
        return (Vec::new(), args);
    };
    let mut config_arguments = vec![program.clone()];

    while let Some((argument, rest)) = remaining.split_first() {
        let FlagAction::Include { needs_value } = classify_flag(argument) else {
            break;
        };
        config_arguments.push(argument.clone());
        remaining = rest;
        if needs_value && let Some((value, after_value)) = remaining.split_first() {
            config_arguments.push(value.clone());
            remaining = after_value;
        }
    }
    (config_arguments, remaining)
}

fn classify_flag(argument: &OsStr) -> FlagAction {
    let Some(text) = argument.to_str() else {
        return FlagAction::Stop;
    };
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or((text, false), |(flag, _)| (flag, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::inline("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case::separate("--log-filter", FlagAction::Include { needs_value: true })]
    #[case::positional("dotnet", FlagAction::Stop)]
    #[case::unknown("--unknown", FlagAction::Stop)]
    #[case::worker_flag("--persistent_worker", FlagAction::Stop)]
    fn flags_are_classified(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify_flag(OsStr::new(argument)), expected);
    }

    #[test]
    fn worker_mode_is_selected_by_flag() {
        let parsed = parse_invocation(&args(&[
            "compiler-worker",
            "/usr/bin/dotnet",
            "/sdk/csc.dll",
            "--persistent_worker",
        ]))
        .expect("parse");

        assert_eq!(parsed.config_arguments, args(&["compiler-worker"]));
        assert_eq!(
            parsed.invocation,
            Invocation::Worker(CompilerCommand::new("/usr/bin/dotnet", "/sdk/csc.dll"))
        );
    }

    #[test]
    fn worker_flag_may_appear_anywhere() {
        let parsed = parse_invocation(&args(&[
            "compiler-worker",
            "--persistent_worker",
            "/usr/bin/dotnet",
            "/sdk/csc.dll",
        ]))
        .expect("parse");
        assert!(matches!(parsed.invocation, Invocation::Worker(_)));
    }

    #[test]
    fn leading_config_flags_are_split_off() {
        let parsed = parse_invocation(&args(&[
            "compiler-worker",
            "--wire-format",
            "json",
            "--log-filter=debug",
            "/usr/bin/dotnet",
            "/sdk/csc.dll",
            "--persistent_worker",
        ]))
        .expect("parse");

        assert_eq!(
            parsed.config_arguments,
            args(&[
                "compiler-worker",
                "--wire-format",
                "json",
                "--log-filter=debug"
            ])
        );
        assert!(matches!(parsed.invocation, Invocation::Worker(_)));
    }

    #[test]
    fn standalone_arguments_pass_through_untouched() {
        let parsed = parse_invocation(&args(&[
            "compiler-worker",
            "/usr/bin/dotnet",
            "/sdk/csc.dll",
            "--log-filter=debug",
            "/out:a.dll",
        ]))
        .expect("parse");

        assert_eq!(
            parsed.invocation,
            Invocation::Standalone {
                command: CompilerCommand::new("/usr/bin/dotnet", "/sdk/csc.dll"),
                arguments: args(&["--log-filter=debug", "/out:a.dll"]),
            }
        );
    }

    #[rstest]
    #[case::nothing(&["compiler-worker"], UsageError::MissingCompiler { count: 0 })]
    #[case::executable_only(&["compiler-worker", "dotnet"], UsageError::MissingCompiler { count: 1 })]
    #[case::worker_without_compiler(
        &["compiler-worker", "dotnet", "--persistent_worker"],
        UsageError::WorkerArity { count: 1 }
    )]
    #[case::worker_with_extra(
        &["compiler-worker", "dotnet", "csc.dll", "a.cs", "--persistent_worker"],
        UsageError::WorkerArity { count: 3 }
    )]
    fn invalid_command_lines_are_rejected(#[case] values: &[&str], #[case] expected: UsageError) {
        assert_eq!(parse_invocation(&args(values)), Err(expected));
    }

    #[test]
    fn empty_argument_list_is_rejected() {
        assert_eq!(
            parse_invocation(&[]),
            Err(UsageError::MissingCompiler { count: 0 })
        );
    }
}
