use std::ffi::OsString;

const PREDEFINED_COMMANDS: &[&str] = &["run", "check", "eval", "help"];

/// `patchloop <DIR>` is shorthand for `patchloop run <DIR>`.
pub(crate) fn normalize_cli_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut normalized: Vec<OsString> = args.into_iter().collect();
    if normalized.len() < 2 {
        return normalized;
    }

    let first = normalized[1].to_string_lossy();
    let is_known_subcommand = PREDEFINED_COMMANDS.contains(&first.as_ref());
    let is_flag = first.starts_with('-');

    if !is_known_subcommand && !is_flag {
        normalized.insert(1, OsString::from("run"));
    }

    normalized
}
