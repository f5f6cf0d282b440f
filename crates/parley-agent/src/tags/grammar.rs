use std::sync::LazyLock;

use parley_core::ReactionKind;
use regex::Regex;

static REACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[reaction:(?:(-?\d+):)?(\w+)\]").expect("invalid reaction regex")
});
static STICKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[sticker:(\w+)\]").expect("invalid sticker regex"));
static QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\[quote:(-?\d+)\](.*?)\[/quote\]").expect("invalid quote regex")
});
static MSG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[msg\](.*?)\[/msg\]").expect("invalid msg regex"));
static UNDO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[undo:(-?\d+)\]").expect("invalid undo regex"));
/// Openers without a closer and stray closers. Only matters at finalization.
static DANGLING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[quote:-?\d+\]|\[/quote\]|\[msg\]|\[/msg\]").expect("invalid dangling regex")
});

/// A discrete chat action requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Emotive reaction. Without an index it targets the message being answered.
    Reaction {
        kind: ReactionKind,
        related_index: Option<i64>,
    },
    Sticker {
        keyword: String,
    },
    /// Chat message. `quote_index >= 0` quotes history, `< 0` quotes our own output.
    Message {
        text: String,
        quote_index: Option<i64>,
    },
    /// Retract one of our own messages (negative = relative to newest).
    Undo {
        target_index: i64,
    },
}

impl Action {
    /// Canonical identity used to suppress repeats within one run.
    pub fn key(&self) -> String {
        match self {
            Action::Reaction {
                kind,
                related_index: Some(n),
            } => format!("reaction:{n}:{kind}"),
            Action::Reaction {
                kind,
                related_index: None,
            } => format!("reaction:{kind}"),
            Action::Sticker { keyword } => format!("sticker:{keyword}"),
            Action::Message {
                text,
                quote_index: Some(n),
            } => format!("msg:quote:{n}:{text}"),
            Action::Message {
                text,
                quote_index: None,
            } => format!("msg:{text}"),
            Action::Undo { target_index } => format!("undo:{target_index}"),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Action::Reaction { .. } => Category::Reaction,
            Action::Sticker { .. } => Category::Sticker,
            Action::Message {
                quote_index: Some(_),
                ..
            } => Category::Quote,
            Action::Message { .. } => Category::Message,
            Action::Undo { .. } => Category::Undo,
        }
    }
}

/// Tag families, in the order a scan visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Reaction,
    Sticker,
    Quote,
    Message,
    Undo,
}

impl Category {
    pub const SCAN_ORDER: [Category; 5] = [
        Category::Reaction,
        Category::Sticker,
        Category::Quote,
        Category::Message,
        Category::Undo,
    ];
}

/// Every well-formed tag of `category` in `text`, in match order.
///
/// Tags with an unknown reaction kind, an out-of-range index, or an empty
/// message body are skipped. Message bodies are returned with any nested
/// tags removed.
pub fn scan(text: &str, category: Category) -> Vec<Action> {
    match category {
        Category::Reaction => REACTION_RE
            .captures_iter(text)
            .filter_map(|c| {
                let kind = c[2].parse::<ReactionKind>().ok()?;
                let related_index = match c.get(1) {
                    Some(n) => Some(n.as_str().parse::<i64>().ok()?),
                    None => None,
                };
                Some(Action::Reaction {
                    kind,
                    related_index,
                })
            })
            .collect(),
        Category::Sticker => STICKER_RE
            .captures_iter(text)
            .map(|c| Action::Sticker {
                keyword: c[1].to_string(),
            })
            .collect(),
        Category::Quote => QUOTE_RE
            .captures_iter(text)
            .filter_map(|c| {
                let index = c[1].parse::<i64>().ok()?;
                let body = strip_tags(&c[2]);
                (!body.is_empty()).then_some(Action::Message {
                    text: body,
                    quote_index: Some(index),
                })
            })
            .collect(),
        Category::Message => MSG_RE
            .captures_iter(text)
            .filter_map(|c| {
                let body = strip_tags(&c[1]);
                (!body.is_empty()).then_some(Action::Message {
                    text: body,
                    quote_index: None,
                })
            })
            .collect(),
        Category::Undo => UNDO_RE
            .captures_iter(text)
            .filter_map(|c| {
                Some(Action::Undo {
                    target_index: c[1].parse::<i64>().ok()?,
                })
            })
            .collect(),
    }
}

/// Remove every tag from `text` and trim the result.
///
/// Complete tags of all kinds are removed along with their bodies (quote and
/// msg blocks are delivered separately). Dangling `[quote:N]` / `[msg]`
/// openers and stray closers are removed as bare markers. Horizontal
/// whitespace left on both sides of a removed tag collapses to one space.
pub fn strip_tags(text: &str) -> String {
    let mut spans: Vec<(usize, usize)> = [
        &*REACTION_RE,
        &*STICKER_RE,
        &*QUOTE_RE,
        &*MSG_RE,
        &*UNDO_RE,
    ]
    .iter()
    .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
    .collect();

    // Dangling markers only count outside complete blocks.
    let blocks = spans.clone();
    spans.extend(
        DANGLING_RE
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .filter(|&(s, e)| !blocks.iter().any(|&(bs, be)| s >= bs && e <= be)),
    );

    remove_spans(text, spans)
}

fn remove_spans(text: &str, mut spans: Vec<(usize, usize)>) -> String {
    if spans.is_empty() {
        return text.trim().to_string();
    }
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut after_tag = false;
    for (start, end) in merged {
        push_segment(&mut out, &text[cursor..start], after_tag);
        cursor = end;
        after_tag = true;
    }
    push_segment(&mut out, &text[cursor..], after_tag);
    out.trim().to_string()
}

fn push_segment(out: &mut String, segment: &str, after_tag: bool) {
    let collapse = after_tag && (out.is_empty() || out.ends_with([' ', '\t']));
    if collapse {
        out.push_str(segment.trim_start_matches([' ', '\t']));
    } else {
        out.push_str(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_forms_and_keys() {
        let found = scan("[reaction:HAHA] [reaction:2:heart] [reaction:-1:wow]", Category::Reaction);
        assert_eq!(
            found,
            vec![
                Action::Reaction { kind: ReactionKind::Haha, related_index: None },
                Action::Reaction { kind: ReactionKind::Heart, related_index: Some(2) },
                Action::Reaction { kind: ReactionKind::Wow, related_index: Some(-1) },
            ]
        );
        assert_eq!(found[0].key(), "reaction:haha");
        assert_eq!(found[1].key(), "reaction:2:heart");
    }

    #[test]
    fn unknown_reaction_kind_is_ignored() {
        assert!(scan("[reaction:none] [reaction:love]", Category::Reaction).is_empty());
    }

    #[test]
    fn sticker_keyword_keeps_unicode() {
        let found = scan("[STICKER:vui] [sticker:chào]", Category::Sticker);
        assert_eq!(
            found,
            vec![
                Action::Sticker { keyword: "vui".into() },
                Action::Sticker { keyword: "chào".into() },
            ]
        );
    }

    #[test]
    fn quote_and_msg_bodies_are_trimmed() {
        let text = "[quote:-1]  again?  [/quote][MSG]\nline one\nline two\n[/msg]";
        assert_eq!(
            scan(text, Category::Quote),
            vec![Action::Message { text: "again?".into(), quote_index: Some(-1) }]
        );
        assert_eq!(
            scan(text, Category::Message),
            vec![Action::Message { text: "line one\nline two".into(), quote_index: None }]
        );
    }

    #[test]
    fn quote_key_differs_from_plain_msg_key() {
        let quoted = Action::Message { text: "ok".into(), quote_index: Some(0) };
        let plain = Action::Message { text: "ok".into(), quote_index: None };
        assert_ne!(quoted.key(), plain.key());
        assert_eq!(plain.key(), "msg:ok");
    }

    #[test]
    fn empty_bodies_are_skipped() {
        assert!(scan("[msg]   [/msg]", Category::Message).is_empty());
        assert!(scan("[quote:1][/quote]", Category::Quote).is_empty());
    }

    #[test]
    fn nested_tags_do_not_leak_into_bodies() {
        let found = scan("[msg]nice [reaction:haha] one[/msg]", Category::Message);
        assert_eq!(found, vec![Action::Message { text: "nice one".into(), quote_index: None }]);
    }

    #[test]
    fn undo_indexes() {
        assert_eq!(
            scan("[undo:-1][undo:3]", Category::Undo),
            vec![Action::Undo { target_index: -1 }, Action::Undo { target_index: 3 }]
        );
    }

    #[test]
    fn oversized_index_is_skipped() {
        assert!(scan("[undo:99999999999999999999999]", Category::Undo).is_empty());
    }

    #[test]
    fn strip_collapses_whitespace_around_tags() {
        assert_eq!(
            strip_tags("Hello [reaction:haha] [sticker:love] friend"),
            "Hello friend"
        );
    }

    #[test]
    fn strip_removes_blocks_and_dangling_markers() {
        assert_eq!(strip_tags("a [msg]x[/msg] b [undo:-1]"), "a b");
        assert_eq!(strip_tags("intro [msg]never closed"), "intro never closed");
        assert_eq!(strip_tags("[quote:2]half"), "half");
        assert_eq!(strip_tags("stray [/msg] closer"), "stray closer");
    }

    #[test]
    fn strip_without_tags_only_trims() {
        assert_eq!(strip_tags("  two  spaces kept  "), "two  spaces kept");
    }

    #[test]
    fn strip_keeps_newlines() {
        assert_eq!(strip_tags("line one [sticker:ok]\nline two"), "line one \nline two");
    }
}
