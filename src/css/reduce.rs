//! Structural removal of rules that match nothing in the bundle markup.

use super::rules::{CssRule, Declaration, Stylesheet};
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

/// Pseudo-classes that depend on user interaction and never match a static tree
const DYNAMIC_PSEUDO_CLASSES: &[&str] = &[
    "hover",
    "focus",
    "focus-within",
    "focus-visible",
    "active",
    "visited",
    "target",
];

/// Pseudo-elements still written with a single colon
const LEGACY_PSEUDO_ELEMENTS: &[&str] = &["before", "after", "first-line", "first-letter"];

static PSEUDO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"::?(-?[A-Za-z][\w-]*)(\()?").expect("pseudo pattern is valid"));

/// Reduces stylesheets against one parsed HTML document
pub struct Reducer {
    document: Html,
    verdicts: HashMap<String, bool>,
}

impl Reducer {
    /// `used_html` is the full bundle page the reduced stylesheet will style
    pub fn new(used_html: &str) -> Self {
        Self {
            document: Html::parse_document(used_html),
            verdicts: HashMap::new(),
        }
    }

    /// Keep only rules that apply to the document, in their original order
    pub fn reduce(&mut self, sheet: &Stylesheet) -> Stylesheet {
        let kept = self.reduce_rules(&sheet.rules);

        let mut animations = HashSet::new();
        collect_animation_names(&kept, &mut animations);

        Stylesheet {
            rules: prune_keyframes(kept, &animations),
        }
    }

    fn reduce_rules(&mut self, rules: &[CssRule]) -> Vec<CssRule> {
        let mut kept = Vec::new();
        for rule in rules {
            match rule {
                CssRule::Style { selectors, .. } => {
                    if self.selector_list_matches(selectors) {
                        kept.push(rule.clone());
                    }
                }
                // Decided once animation names are known
                CssRule::Group { .. } if is_keyframes(rule) => kept.push(rule.clone()),
                CssRule::Group { prelude, rules } => {
                    let nested = self.reduce_rules(rules);
                    if !nested.is_empty() {
                        kept.push(CssRule::Group {
                            prelude: prelude.clone(),
                            rules: nested,
                        });
                    }
                }
                CssRule::Descriptor { .. } | CssRule::Statement { .. } => kept.push(rule.clone()),
            }
        }
        kept
    }

    fn selector_list_matches(&mut self, selectors: &str) -> bool {
        split_selector_list(selectors)
            .into_iter()
            .any(|selector| self.selector_matches(selector))
    }

    fn selector_matches(&mut self, selector: &str) -> bool {
        if let Some(verdict) = self.verdicts.get(selector) {
            return *verdict;
        }

        let normalized = strip_stateful_pseudos(selector);
        let verdict = match Selector::parse(&normalized) {
            Ok(parsed) => self.document.select(&parsed).next().is_some(),
            Err(e) => {
                ::log::debug!("Keeping unsupported selector `{selector}`: {e}");
                true
            }
        };

        self.verdicts.insert(selector.to_string(), verdict);
        verdict
    }
}

/// Convenience wrapper: reduce `sheet` against `used_html`
pub fn reduce(sheet: &Stylesheet, used_html: &str) -> Stylesheet {
    Reducer::new(used_html).reduce(sheet)
}

fn is_keyframes(rule: &CssRule) -> bool {
    rule.at_rule_name().as_deref() == Some("keyframes")
}

fn keyframes_name(prelude: &str) -> &str {
    prelude
        .split_once(char::is_whitespace)
        .map(|(_, name)| name.trim().trim_matches('"'))
        .unwrap_or("")
}

fn is_animation_property(declaration: &Declaration) -> bool {
    let property = declaration.property.to_ascii_lowercase();
    let unprefixed = property
        .strip_prefix('-')
        .and_then(|p| p.split_once('-'))
        .map(|(_, rest)| rest)
        .unwrap_or(property.as_str());
    matches!(unprefixed, "animation" | "animation-name")
}

fn collect_animation_names(rules: &[CssRule], names: &mut HashSet<String>) {
    for rule in rules {
        match rule {
            CssRule::Style { declarations, .. } | CssRule::Descriptor { declarations, .. } => {
                for declaration in declarations.iter().filter(|d| is_animation_property(d)) {
                    names.extend(
                        declaration
                            .value
                            .split([',', ' '])
                            .map(|word| word.trim_matches('"'))
                            .filter(|word| !word.is_empty())
                            .map(str::to_string),
                    );
                }
            }
            CssRule::Group { rules, .. } if !is_keyframes(rule) => {
                collect_animation_names(rules, names)
            }
            _ => {}
        }
    }
}

fn prune_keyframes(rules: Vec<CssRule>, animations: &HashSet<String>) -> Vec<CssRule> {
    rules
        .into_iter()
        .filter_map(|rule| {
            if is_keyframes(&rule) {
                let used = match &rule {
                    CssRule::Group { prelude, .. } => animations.contains(keyframes_name(prelude)),
                    _ => true,
                };
                return used.then_some(rule);
            }
            match rule {
                CssRule::Group { prelude, rules } => {
                    let rules = prune_keyframes(rules, animations);
                    (!rules.is_empty()).then_some(CssRule::Group { prelude, rules })
                }
                other => Some(other),
            }
        })
        .collect()
}

/// Split a selector list on top-level commas
fn split_selector_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in list.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Byte ranges of quoted strings in a selector, quotes included
fn quoted_spans(selector: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;
    let mut escaped = false;

    for (i, c) in selector.char_indices() {
        match open {
            _ if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some((q, start)) if c == q => {
                spans.push(start..i + 1);
                open = None;
            }
            Some(_) => {}
            None if c == '"' || c == '\'' => open = Some((c, i)),
            None => {}
        }
    }
    if let Some((_, start)) = open {
        spans.push(start..selector.len());
    }
    spans
}

/// Remove pseudo-elements and interaction pseudo-classes so the selector can
/// be evaluated against a static tree. A compound left empty becomes `*`.
/// Attribute values are left as written.
fn strip_stateful_pseudos(selector: &str) -> String {
    let quoted = quoted_spans(selector);
    PSEUDO
        .replace_all(selector, |caps: &Captures| {
            let whole = &caps[0];
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if caps.get(2).is_some() || quoted.iter().any(|span| span.contains(&start)) {
                return whole.to_string();
            }

            let name = caps[1].to_ascii_lowercase();
            let strip = whole.starts_with("::")
                || name.starts_with('-')
                || LEGACY_PSEUDO_ELEMENTS.contains(&name.as_str())
                || DYNAMIC_PSEUDO_CLASSES.contains(&name.as_str());
            if !strip {
                return whole.to_string();
            }

            let starts_compound = selector[..start]
                .chars()
                .next_back()
                .is_none_or(|c| c.is_whitespace() || matches!(c, '>' | '+' | '~' | '('));
            if starts_compound {
                "*".to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}
