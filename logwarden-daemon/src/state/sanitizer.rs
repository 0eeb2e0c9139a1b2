//! Command-line sanitizer for process listings.
//!
//! Values of credential-bearing arguments are replaced by `[REDACTED]`
//! before a command line is copied into a report.

/// Replacement text for a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Flags whose next argument is always a secret (compared case-insensitively).
///
/// `-p` is not listed (port for ssh, password for mysql).
const SECRET_FLAGS: &[&str] = &[
    "--password",
    "--token",
    "--api-key",
    "--apikey",
    "--secret",
    "--client-secret",
    "--access-token",
    "--auth-token",
    "--session-id",
];

/// Key names that are secrets on their own.
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "key", "auth"];

/// Key suffixes that mark a secret.
///
/// Suffixes starting with a separator match anywhere; the others need a
/// separator (or nothing) in front so that `keyboard` or `passwords_file`
/// style names are not caught by accident.
const SECRET_SUFFIXES: &[&str] = &[
    "password",
    "token",
    "secret",
    "_key",
    "-key",
    ".key",
    "signature",
    "credential",
    "cookie",
    "session",
];

/// Join `args` with spaces, redacting secret values.
///
/// - `--flag=value` / `KEY=value`: the value is redacted when the key looks secret
/// - `--password value`: the next argument is redacted
/// - `--db-password value`: the next argument is redacted unless it is another flag
pub fn sanitize_command<S: AsRef<str>>(args: &[S]) -> String {
    let mut out: Vec<String> = Vec::with_capacity(args.len());
    let mut redact_next = false;

    for (i, arg) in args.iter().enumerate() {
        let arg = arg.as_ref();
        if redact_next {
            out.push(REDACTED.to_owned());
            redact_next = false;
            continue;
        }

        if let Some((key, _value)) = arg.split_once('=') {
            if is_secret_key(key.trim_start_matches('-')) || is_secret_flag(key) {
                out.push(format!("{key}={REDACTED}"));
            } else {
                out.push(arg.to_owned());
            }
            continue;
        }

        let has_next = i + 1 < args.len();
        if is_secret_flag(arg) {
            redact_next = has_next;
        } else if is_secret_key(arg.trim_start_matches('-')) {
            redact_next = has_next && !args[i + 1].as_ref().starts_with('-');
        }
        out.push(arg.to_owned());
    }

    out.join(" ")
}

fn is_secret_flag(flag: &str) -> bool {
    SECRET_FLAGS.iter().any(|f| f.eq_ignore_ascii_case(flag))
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    if SECRET_KEYS.contains(&key.as_str()) {
        return true;
    }

    SECRET_SUFFIXES.iter().any(|suffix| {
        let Some(head) = key.strip_suffix(suffix) else {
            return false;
        };
        head.is_empty()
            || suffix.starts_with(['-', '_', '.'])
            || head.ends_with(['-', '_', '.'])
    })
}
