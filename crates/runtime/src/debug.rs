//! Debugger-attach instrumentation for the worker process.
//!
//! When the host was launched with a debug-attach request for the worker,
//! the spawn gains extra process flags: lazy module evaluation is always
//! disabled, and exactly one of the break-on-start / attach-only inspect
//! flags is emitted.

const INSPECT_FLAG: &str = "--inspect-ptyhost";
const INSPECT_BRK_FLAG: &str = "--inspect-brk-ptyhost";
const DEFAULT_PORT: u16 = 5877;

/// A request to attach a debugger to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugRequest {
    pub port: u16,
    /// Break on the worker's first statement instead of attaching passively.
    pub break_on_start: bool,
}

impl DebugRequest {
    /// Extracts a debug-attach request from the host's argv, if present.
    ///
    /// Recognizes `--inspect-ptyhost[=port]` and
    /// `--inspect-brk-ptyhost[=port]`; the break variant wins when both are
    /// given. Everything else in the argv is ignored here — generic option
    /// parsing belongs to the host.
    pub fn parse<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut request = None;
        for arg in args {
            let arg = arg.as_ref();
            if let Some(port) = match_flag(arg, INSPECT_BRK_FLAG) {
                return Some(Self {
                    port,
                    break_on_start: true,
                });
            }
            if let Some(port) = match_flag(arg, INSPECT_FLAG) {
                request = Some(Self {
                    port,
                    break_on_start: false,
                });
            }
        }
        request
    }
}

fn match_flag(arg: &str, flag: &str) -> Option<u16> {
    if arg == flag {
        return Some(DEFAULT_PORT);
    }
    let value = arg.strip_prefix(flag)?.strip_prefix('=')?;
    value.parse().ok().or(Some(DEFAULT_PORT))
}

/// Computes the extra process flags for the worker spawn. Pure: no debug
/// request means no extra flags at all.
pub fn launch_args(request: Option<&DebugRequest>) -> Vec<String> {
    let Some(request) = request else {
        return Vec::new();
    };
    let inspect = if request.break_on_start {
        format!("--inspect-brk={}", request.port)
    } else {
        format!("--inspect={}", request.port)
    };
    vec!["--nolazy".to_string(), inspect]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_request_means_no_flags() {
        assert!(launch_args(None).is_empty());
    }

    #[test]
    fn break_request_emits_brk_flag_only() {
        let args = launch_args(Some(&DebugRequest {
            port: 9230,
            break_on_start: true,
        }));
        assert_eq!(args, ["--nolazy", "--inspect-brk=9230"]);
        assert!(!args.iter().any(|a| a.starts_with("--inspect=")));
    }

    #[test]
    fn attach_request_emits_inspect_flag_only() {
        let args = launch_args(Some(&DebugRequest {
            port: 9230,
            break_on_start: false,
        }));
        assert_eq!(args, ["--nolazy", "--inspect=9230"]);
        assert!(!args.iter().any(|a| a.starts_with("--inspect-brk")));
    }

    #[test]
    fn parses_port_from_argv() {
        let request = DebugRequest::parse(["--foo", "--inspect-ptyhost=9333"]).unwrap();
        assert_eq!(request.port, 9333);
        assert!(!request.break_on_start);
    }

    #[test]
    fn bare_flag_uses_default_port() {
        let request = DebugRequest::parse(["--inspect-brk-ptyhost"]).unwrap();
        assert_eq!(request.port, DEFAULT_PORT);
        assert!(request.break_on_start);
    }

    #[test]
    fn break_variant_wins_over_attach() {
        let request =
            DebugRequest::parse(["--inspect-ptyhost=9000", "--inspect-brk-ptyhost=9001"]).unwrap();
        assert!(request.break_on_start);
        assert_eq!(request.port, 9001);
    }

    #[test]
    fn absent_flags_yield_none() {
        assert_eq!(DebugRequest::parse(["--verbose", "--inspect"]), None);
    }
}
