use crate::backend::{BreakpointAck, FrameRecord, State, ThreadRecord, Variable};
use crate::lldb::models::LineKind;
use regex::Regex;
use std::sync::OnceLock;

/// Thread header layout installed via `settings set thread-format`.
pub(crate) const THREAD_FORMAT: &str = "thread #${thread.index}: tid = ${thread.id%tid}{, ${frame.pc}}{ ${module.file.basename}{`${function.name-with-args}{${function.pc-offset}}}}{ at ${line.file.fullpath}:${line.number}{:${line.column}}}{, stop reason = ${thread.stop-reason}}\\n";

/// Frame line layout installed via `settings set frame-format`.
pub(crate) const FRAME_FORMAT: &str = "frame #${frame.index}: ${frame.pc}{ ${module.file.basename}{`${function.name-with-args}{${function.pc-offset}}}}{ at ${line.file.fullpath}:${line.number}{:${line.column}}}\\n";

/// Name of the no-op command sent after every real one. LLDB rejects it,
/// and its echo or rejection marks the end of the previous response.
pub(crate) const SYNC_COMMAND: &str = "lldb-nav-sync-";

macro_rules! cached_regex {
    ($name:ident, $pat:expr) => {
        fn $name() -> Option<&'static Regex> {
            static RE: OnceLock<Option<Regex>> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pat).ok()).as_ref()
        }
    };
}

cached_regex!(
    thread_re,
    r"^\s*(?P<sel>\*)?\s*thread #(?P<idx>\d+): tid = (?P<tid>0x[0-9a-fA-F]+|\d+)(?:, (?P<pc>0x[0-9a-fA-F]+))?(?: (?P<module>[^`\s,]+)(?:`(?P<symbol>.*?)(?: \+ (?P<offset>\d+))?)?)?(?: at (?P<file>[^:]+):(?P<line>\d+)(?::(?P<col>\d+))?)?(?:, stop reason = (?P<reason>.*?))?(?:, (?:name|queue) = .*)?\s*$"
);
cached_regex!(
    frame_re,
    r"^\s*(?P<sel>\*)?\s*frame #(?P<idx>\d+): (?P<pc>0x[0-9a-fA-F]+)(?: (?P<module>[^`\s]+)(?:`(?P<symbol>.*?)(?: \+ (?P<offset>\d+))?)?)?(?: at (?P<file>[^:]+):(?P<line>\d+)(?::(?P<col>\d+))?)?\s*$"
);
cached_regex!(sync_re, r"lldb-nav-sync-(\d+)");
cached_regex!(process_re, r"^\s*Process (\d+) ([a-z]+)");
cached_regex!(breakpoint_re, r"^Breakpoint (\d+): (.*)$");
cached_regex!(locations_re, r"(\d+) locations");
cached_regex!(list_locations_re, r"locations = (\d+)");
cached_regex!(
    target_re,
    r"^Current executable set to '(?P<path>.*)' \((?P<arch>[^)]*)\)\.?\s*$"
);
cached_regex!(
    variable_re,
    r"^\((?P<ty>.*?)\) (?P<name>[^=]+?) = (?P<value>.*)$"
);
cached_regex!(
    crash_re,
    r"stop reason = (?:signal SIG(?:SEGV|BUS|ILL|FPE|ABRT)|EXC_BAD_ACCESS|EXC_BAD_INSTRUCTION|EXC_ARITHMETIC|EXC_CRASH)"
);

/// Parse a hex (`0x...`) or decimal integer.
pub(crate) fn parse_u64(s: &str) -> Option<u64> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse::<u64>().ok()
    }
}

fn non_empty(s: Option<regex::Match<'_>>) -> Option<String> {
    s.map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_num<T: std::str::FromStr>(m: Option<regex::Match<'_>>) -> Option<T> {
    m.and_then(|m| m.as_str().parse::<T>().ok())
}

/// Parse a `thread #<idx>: tid = <id>, ...` line. The frame list is left empty.
pub(crate) fn parse_thread_line(line: &str) -> Option<ThreadRecord> {
    let caps = thread_re()?.captures(line)?;
    Some(ThreadRecord {
        index: parse_num(caps.name("idx"))?,
        id: parse_u64(caps.name("tid")?.as_str())?,
        selected: caps.name("sel").is_some(),
        stop_reason: non_empty(caps.name("reason")),
        frames: Vec::new(),
    })
}

/// Parse a `frame #<idx>: <pc> <module>`<symbol> ...` line.
pub(crate) fn parse_frame_line(line: &str) -> Option<FrameRecord> {
    let caps = frame_re()?.captures(line)?;
    Some(FrameRecord {
        index: parse_num(caps.name("idx"))?,
        selected: caps.name("sel").is_some(),
        pc: caps.name("pc").and_then(|m| parse_u64(m.as_str())),
        module: non_empty(caps.name("module")),
        symbol: non_empty(caps.name("symbol")),
        offset: parse_num(caps.name("offset")),
        file: non_empty(caps.name("file")),
        line: parse_num(caps.name("line")),
        column: parse_num(caps.name("col")),
    })
}

/// Parse `thread backtrace all` output: thread headers each followed by their frames.
pub(crate) fn parse_backtrace<S: AsRef<str>>(lines: &[S]) -> Vec<ThreadRecord> {
    let mut threads: Vec<ThreadRecord> = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if let Some(thread) = parse_thread_line(line) {
            threads.push(thread);
            continue;
        }
        if let Some(frame) = parse_frame_line(line) {
            if let Some(current) = threads.last_mut() {
                current.frames.push(frame);
            }
        }
    }
    threads
}

/// Interpret the response to `breakpoint set`. `Err` carries LLDB's message.
pub(crate) fn parse_breakpoint_ack<S: AsRef<str>>(
    lines: &[S],
) -> std::result::Result<BreakpointAck, String> {
    let Some(re) = breakpoint_re() else {
        return Err("breakpoint pattern unavailable".to_string());
    };
    for line in lines {
        let line = line.as_ref().trim();
        if let Some(msg) = line.strip_prefix("error: ") {
            return Err(msg.trim().to_string());
        }
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let Some(id) = caps[1].parse::<u32>().ok() else {
            continue;
        };
        let rest = &caps[2];
        if rest.contains("no locations") {
            return Ok(BreakpointAck::Pending { id });
        }
        let locations = locations_re()
            .and_then(|re| re.captures(rest))
            .and_then(|c| c[1].parse::<u32>().ok())
            .unwrap_or(1);
        return Ok(BreakpointAck::Resolved { id, locations });
    }
    Err("no breakpoint acknowledgement in response".to_string())
}

/// Location count from `breakpoint list <id>`.
pub(crate) fn parse_breakpoint_locations<S: AsRef<str>>(lines: &[S]) -> Option<u32> {
    let re = list_locations_re()?;
    lines
        .iter()
        .find_map(|l| re.captures(l.as_ref()).and_then(|c| c[1].parse().ok()))
}

/// Parse the acknowledgement of `target create`. `Ok` carries the architecture.
pub(crate) fn parse_target_created<S: AsRef<str>>(
    lines: &[S],
) -> std::result::Result<String, String> {
    for line in lines {
        let line = line.as_ref().trim();
        if let Some(msg) = line.strip_prefix("error: ") {
            return Err(msg.trim().to_string());
        }
        if let Some(caps) = target_re().and_then(|re| re.captures(line)) {
            return Ok(caps["arch"].to_string());
        }
    }
    Err("no target acknowledgement in response".to_string())
}

/// Parse `frame variable`. Members of an aggregate are printed on indented
/// lines after `{`; they are folded into the parent's value.
pub(crate) fn parse_variables<S: AsRef<str>>(lines: &[S]) -> Vec<Variable> {
    let Some(re) = variable_re() else {
        return Vec::new();
    };
    let mut vars: Vec<Variable> = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        let top_level = !line.starts_with(char::is_whitespace);
        if let Some(caps) = re.captures(line).filter(|_| top_level) {
            vars.push(Variable {
                name: caps["name"].trim().to_string(),
                type_name: caps["ty"].to_string(),
                value: caps["value"].trim().to_string(),
            });
        } else if let Some(last) = vars.last_mut() {
            last.value.push(' ');
            last.value.push_str(line.trim());
        }
    }
    vars
}

/// First `Process <pid> <state>` line, as (pid, state).
pub(crate) fn parse_process_event(line: &str) -> Option<(u32, State)> {
    let caps = process_re()?.captures(line)?;
    let pid = caps[1].parse::<u32>().ok()?;
    let state = State::from_process_word(&caps[2])?;
    Some((pid, state))
}

pub(crate) fn is_crash_reason(line: &str) -> bool {
    crash_re().map(|re| re.is_match(line)).unwrap_or(false)
}

pub(crate) fn classify_line(line: &str) -> LineKind {
    if let Some((pid, state)) = parse_process_event(line) {
        return LineKind::ProcessEvent { pid, state };
    }
    if is_crash_reason(line) {
        return LineKind::CrashReason;
    }
    LineKind::Text
}

/// Quote a command argument for the LLDB command interpreter.
pub(crate) fn quote_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for ch in arg.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Sequence number of a sync command mentioned on `line`.
pub(crate) fn parse_sync_token(line: &str) -> Option<u64> {
    sync_re()?.captures(line)?[1].parse().ok()
}

/// Drop a leading prompt that LLDB redraws in front of asynchronous output.
pub(crate) fn strip_prompt<'a>(line: &'a str, prompt: &str) -> &'a str {
    let mut rest = line;
    while let Some(stripped) = rest.strip_prefix(prompt) {
        rest = stripped;
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKTRACE: &str = "\
* thread #1: tid = 0x1c03, 0x0000000100000f5d a.out`main(argc=1, argv=0x00007ffeefbff5a8) + 13 at /tmp/demo/main.c:5:3, stop reason = breakpoint 1.1
  * frame #0: 0x0000000100000f5d a.out`main(argc=1, argv=0x00007ffeefbff5a8) + 13 at /tmp/demo/main.c:5:3
    frame #1: 0x00007fff6f1e2cc9 libdyld.dylib`start + 1
  thread #2: tid = 4242, 0x00007fff6f1e0000 libsystem_kernel.dylib`__workq_kernreturn + 10
    frame #0: 0x00007fff6f1e0000 libsystem_kernel.dylib`__workq_kernreturn + 10
    frame #1: 0x00000000deadbeef
";

    #[test]
    fn parses_thread_header() {
        let t = parse_thread_line(BACKTRACE.lines().next().unwrap()).unwrap();
        assert!(t.selected);
        assert_eq!(t.index, 1);
        assert_eq!(t.id, 0x1c03);
        assert_eq!(t.stop_reason.as_deref(), Some("breakpoint 1.1"));
    }

    #[test]
    fn parses_backtrace_listing() {
        let lines: Vec<&str> = BACKTRACE.lines().collect();
        let threads = parse_backtrace(&lines);
        assert_eq!(threads.len(), 2);

        let main = &threads[0];
        assert_eq!(main.frames.len(), 2);
        let f0 = &main.frames[0];
        assert!(f0.selected);
        assert_eq!(f0.module.as_deref(), Some("a.out"));
        assert_eq!(
            f0.symbol.as_deref(),
            Some("main(argc=1, argv=0x00007ffeefbff5a8)")
        );
        assert_eq!(f0.offset, Some(13));
        assert_eq!(f0.file.as_deref(), Some("/tmp/demo/main.c"));
        assert_eq!(f0.line, Some(5));
        assert_eq!(f0.column, Some(3));
        let f1 = &main.frames[1];
        assert!(!f1.selected);
        assert_eq!(f1.symbol.as_deref(), Some("start"));
        assert_eq!(f1.file, None);

        let worker = &threads[1];
        assert!(!worker.selected);
        assert_eq!(worker.id, 4242);
        assert_eq!(worker.frames[1].pc, Some(0xdeadbeef));
        assert_eq!(worker.frames[1].module, None);
    }

    #[test]
    fn breakpoint_acknowledgements() {
        let ok = ["Breakpoint 3: where = a.out`main + 13 at main.c:5:3, address = 0x0000000100000f5d"];
        assert_eq!(
            parse_breakpoint_ack(&ok),
            Ok(BreakpointAck::Resolved { id: 3, locations: 1 })
        );

        let many = ["Breakpoint 4: 2 locations."];
        assert_eq!(
            parse_breakpoint_ack(&many),
            Ok(BreakpointAck::Resolved { id: 4, locations: 2 })
        );

        let pending = [
            "WARNING:  Unable to resolve breakpoint to any actual locations.",
            "Breakpoint 5: no locations (pending).",
        ];
        assert_eq!(
            parse_breakpoint_ack(&pending),
            Ok(BreakpointAck::Pending { id: 5 })
        );

        let err = ["error: invalid line number: 0."];
        assert_eq!(
            parse_breakpoint_ack(&err),
            Err("invalid line number: 0.".to_string())
        );
    }

    #[test]
    fn breakpoint_list_locations() {
        let lines = ["1: file = 'main.c', line = 10, exact_match = 0, locations = 2, resolved = 2, hit count = 0"];
        assert_eq!(parse_breakpoint_locations(&lines), Some(2));
        assert_eq!(parse_breakpoint_locations(&["nothing"]), None);
    }

    #[test]
    fn target_creation() {
        let ok = ["Current executable set to '/tmp/demo/a.out' (x86_64)."];
        assert_eq!(parse_target_created(&ok), Ok("x86_64".to_string()));
        let err = ["error: unable to find executable for '/nope'"];
        assert!(parse_target_created(&err).is_err());
    }

    #[test]
    fn process_events_and_crashes() {
        assert_eq!(
            parse_process_event("Process 4711 stopped"),
            Some((4711, State::Stopped))
        );
        assert_eq!(
            parse_process_event("Process 4711 exited with status = 0 (0x00000000)"),
            Some((4711, State::Exited))
        );
        assert_eq!(
            parse_process_event("Process 4711 launched: '/tmp/a.out' (x86_64)"),
            Some((4711, State::Running))
        );
        assert_eq!(parse_process_event("Processing 1 stopped"), None);

        assert!(is_crash_reason(
            "* thread #1: tid = 1, 0x0 a.out`f + 4, stop reason = signal SIGSEGV: invalid address"
        ));
        assert!(!is_crash_reason(
            "* thread #1: tid = 1, stop reason = breakpoint 1.1"
        ));
        assert_eq!(classify_line("hello"), LineKind::Text);
    }

    #[test]
    fn frame_variables_fold_aggregates() {
        let lines = [
            "(int) argc = 1",
            "(char **) argv = 0x00007ffeefbff5a8",
            "(point) origin = {",
            "  x = 0",
            "  y = 2",
            "}",
            "(int (*)(int)) cb = 0x0000000100000f00 (a.out`square at main.c:3)",
        ];
        let vars = parse_variables(&lines);
        assert_eq!(vars.len(), 4);
        assert_eq!(vars[0].name, "argc");
        assert_eq!(vars[0].type_name, "int");
        assert_eq!(vars[0].value, "1");
        assert_eq!(vars[1].type_name, "char **");
        assert_eq!(vars[2].value, "{ x = 0 y = 2 }");
        assert_eq!(vars[3].name, "cb");
        assert_eq!(vars[3].type_name, "int (*)(int)");
        assert!(parse_variables(&["error: no frame"]).is_empty());
    }

    #[test]
    fn numbers_and_quoting() {
        assert_eq!(parse_u64("0x1f"), Some(31));
        assert_eq!(parse_u64("42"), Some(42));
        assert_eq!(parse_u64("zz"), None);
        assert_eq!(quote_arg(r#"a "b"\c"#), r#""a \"b\"\\c""#);
        assert_eq!(
            parse_sync_token("error: 'lldb-nav-sync-12' is not a valid command."),
            Some(12)
        );
        assert_eq!(parse_sync_token("(lldb) lldb-nav-sync-3"), Some(3));
        assert_eq!(parse_sync_token("Process 3 stopped"), None);
        assert_eq!(strip_prompt("(lldb) (lldb) Process 1 stopped", "(lldb) "), "Process 1 stopped");
    }
}
