//! Channel MODE line parsing.
//!
//! Uses the common CHANMODES layout: list modes and prefix modes always take
//! a parameter, `k` always does, `l` only when being set.

/// One `+x`/`-x` flag with its parameter, if it takes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub mode: char,
    pub arg: Option<String>,
}

/// Prefix modes, highest rank first.
pub const PREFIX_MODES: [(char, char); 5] = [('q', '~'), ('a', '&'), ('o', '@'), ('h', '%'), ('v', '+')];

fn takes_arg(mode: char, adding: bool) -> bool {
    match mode {
        'q' | 'a' | 'o' | 'h' | 'v' | 'b' | 'e' | 'I' | 'k' => true,
        'l' => adding,
        _ => false,
    }
}

/// Expand `"+ov-b"` with `["alice", "bob", "*!*@x"]` into individual changes.
///
/// Missing parameters yield `arg: None`; surplus parameters are ignored.
pub fn parse_mode_changes(modes: &str, args: &[String]) -> Vec<ModeChange> {
    let mut changes = Vec::new();
    let mut args = args.iter();
    let mut adding = true;

    for c in modes.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            mode => {
                let arg = if takes_arg(mode, adding) {
                    args.next().cloned()
                } else {
                    None
                };
                changes.push(ModeChange { adding, mode, arg });
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mixed_modes_consume_args_in_order() {
        let changes = parse_mode_changes("+ob-v", &args(&["alice", "*!*@spam", "bob"]));
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0], ModeChange { adding: true, mode: 'o', arg: Some("alice".into()) });
        assert_eq!(changes[1].arg.as_deref(), Some("*!*@spam"));
        assert_eq!(changes[2], ModeChange { adding: false, mode: 'v', arg: Some("bob".into()) });
    }

    #[test]
    fn flag_modes_take_no_args() {
        let changes = parse_mode_changes("+nt-l", &args(&["ignored"]));
        assert!(changes.iter().all(|c| c.arg.is_none()));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn limit_takes_arg_only_when_set() {
        let changes = parse_mode_changes("+l", &args(&["25"]));
        assert_eq!(changes[0].arg.as_deref(), Some("25"));
    }

    #[test]
    fn missing_arg_is_none() {
        let changes = parse_mode_changes("+b", &[]);
        assert_eq!(changes[0].arg, None);
    }
}
