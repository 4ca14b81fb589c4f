//! Rule-level CSS model built on `cssparser`'s rule and declaration parsers.
//!
//! Parsing keeps only what the pipeline needs: rule boundaries, selector and
//! at-rule preludes, and declarations. Preludes and values are serialized
//! back in minified form.

use cssparser::{
    AtRuleParser, CowRcStr, DeclarationParser, ParseError, Parser, ParserInput, ParserState,
    QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser, StyleSheetParser, ToCss, Token,
};
use std::fmt;

type CssParseError<'i> = ParseError<'i, ()>;

/// At-rules whose block holds nested rules rather than declarations
const GROUP_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "document",
    "layer",
    "container",
    "scope",
    "starting-style",
    "keyframes",
];

/// A single `property: value` pair; `value` keeps any `!important`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    /// `selector-list { declarations }`
    Style {
        selectors: String,
        declarations: Vec<Declaration>,
    },
    /// Block at-rule containing rules (`@media`, `@supports`, `@keyframes`, ...)
    Group { prelude: String, rules: Vec<CssRule> },
    /// Block at-rule containing declarations (`@font-face`, `@page`, ...)
    Descriptor {
        prelude: String,
        declarations: Vec<Declaration>,
    },
    /// At-rule without a block (`@import`, `@namespace`)
    Statement { prelude: String },
}

impl CssRule {
    /// Lowercase at-rule name without vendor prefix, `None` for style rules
    pub fn at_rule_name(&self) -> Option<String> {
        match self {
            CssRule::Style { .. } => None,
            CssRule::Group { prelude, .. }
            | CssRule::Descriptor { prelude, .. }
            | CssRule::Statement { prelude } => Some(at_rule_name(prelude)),
        }
    }

    /// Number of style and descriptor rules, counting nested ones
    pub fn rule_count(&self) -> usize {
        match self {
            CssRule::Group { rules, .. } => rules.iter().map(CssRule::rule_count).sum(),
            _ => 1,
        }
    }

    fn for_each_declaration_mut(&mut self, f: &mut dyn FnMut(&mut Declaration)) {
        match self {
            CssRule::Style { declarations, .. } | CssRule::Descriptor { declarations, .. } => {
                declarations.iter_mut().for_each(|d| f(d))
            }
            CssRule::Group { rules, .. } => {
                for rule in rules {
                    rule.for_each_declaration_mut(f);
                }
            }
            CssRule::Statement { .. } => {}
        }
    }
}

/// An ordered list of rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
}

impl Stylesheet {
    /// Parse CSS text. Malformed parts are dropped, never reported.
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        Self {
            rules: parse_rule_list(&mut parser),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of style and descriptor rules, counting nested ones
    pub fn rule_count(&self) -> usize {
        self.rules.iter().map(CssRule::rule_count).sum()
    }

    /// Append another stylesheet's rules after this one's
    pub fn extend(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
    }

    /// Visit every declaration in document order
    pub fn for_each_declaration_mut(&mut self, mut f: impl FnMut(&mut Declaration)) {
        for rule in &mut self.rules {
            rule.for_each_declaration_mut(&mut f);
        }
    }
}

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.rules.iter().try_for_each(|rule| write_rule(f, rule))
    }
}

fn write_rule(f: &mut fmt::Formatter<'_>, rule: &CssRule) -> fmt::Result {
    match rule {
        CssRule::Style {
            selectors: prelude,
            declarations,
        }
        | CssRule::Descriptor {
            prelude,
            declarations,
        } => {
            f.write_str(prelude)?;
            f.write_str("{")?;
            for (i, declaration) in declarations.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                write!(f, "{}:{}", declaration.property, declaration.value)?;
            }
            f.write_str("}")
        }
        CssRule::Group { prelude, rules } => {
            f.write_str(prelude)?;
            f.write_str("{")?;
            rules.iter().try_for_each(|rule| write_rule(f, rule))?;
            f.write_str("}")
        }
        CssRule::Statement { prelude } => write!(f, "{prelude};"),
    }
}

/// Lowercase at-rule name of a prelude with any vendor prefix removed
/// (`@-webkit-keyframes spin` -> `keyframes`)
pub(crate) fn at_rule_name(prelude: &str) -> String {
    let name: String = prelude
        .trim_start_matches('@')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase();

    if let Some((_, unprefixed)) = name
        .strip_prefix('-')
        .and_then(|prefixed| prefixed.split_once('-'))
    {
        return unprefixed.to_string();
    }
    name
}

/// Entry of a rule list or block body
enum BodyItem {
    Declaration(Declaration),
    Rule(CssRule),
}

/// Prelude of an at-rule, serialized
struct AtPrelude {
    text: String,
    group: bool,
}

/// Builds rules and declarations for `StyleSheetParser` and `RuleBodyParser`
struct RuleParser {
    /// Whether the block being read holds declarations
    declarations: bool,
}

impl<'i> AtRuleParser<'i> for RuleParser {
    type Prelude = AtPrelude;
    type AtRule = BodyItem;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, CssParseError<'i>> {
        let mut writer = Writer::new(Mode::AtPrelude);
        writer.push(&Token::AtKeyword(name).to_css_string());
        writer.write_all(input);
        if writer.malformed {
            return Err(input.new_custom_error(()));
        }

        let text = writer.finish();
        let group = GROUP_AT_RULES.contains(&at_rule_name(&text).as_str());
        Ok(AtPrelude { text, group })
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        Ok(BodyItem::Rule(CssRule::Statement {
            prelude: prelude.text,
        }))
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, CssParseError<'i>> {
        let rule = if prelude.group {
            let (_, rules) = parse_body(input, false);
            CssRule::Group {
                prelude: prelude.text,
                rules,
            }
        } else {
            CssRule::Descriptor {
                prelude: prelude.text,
                declarations: parse_declaration_body(input),
            }
        };
        Ok(BodyItem::Rule(rule))
    }
}

impl<'i> QualifiedRuleParser<'i> for RuleParser {
    type Prelude = String;
    type QualifiedRule = BodyItem;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, CssParseError<'i>> {
        let mut writer = Writer::new(Mode::Selector);
        writer.write_all(input);
        if writer.malformed || writer.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(writer.finish())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, CssParseError<'i>> {
        Ok(BodyItem::Rule(CssRule::Style {
            declarations: parse_declaration_body(input),
            selectors: prelude,
        }))
    }
}

impl<'i> DeclarationParser<'i> for RuleParser {
    type Declaration = BodyItem;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &ParserState,
    ) -> Result<Self::Declaration, CssParseError<'i>> {
        let mut writer = Writer::new(Mode::Value);
        writer.write_all(input);
        // A `{}` block in a value means this was a nested rule, not a declaration
        if writer.malformed || writer.has_block || writer.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(BodyItem::Declaration(Declaration {
            property: name.to_string(),
            value: writer.finish(),
        }))
    }
}

impl<'i> RuleBodyItemParser<'i, BodyItem, ()> for RuleParser {
    fn parse_declarations(&self) -> bool {
        self.declarations
    }

    fn parse_qualified(&self) -> bool {
        true
    }
}

fn parse_rule_list(parser: &mut Parser<'_, '_>) -> Vec<CssRule> {
    let mut rule_parser = RuleParser {
        declarations: false,
    };
    StyleSheetParser::new(parser, &mut rule_parser)
        .filter_map(|item| match item {
            Ok(BodyItem::Rule(rule)) => Some(rule),
            Ok(BodyItem::Declaration(_)) => None,
            Err((_, slice)) => {
                ::log::debug!("Dropping malformed CSS `{}`", slice.trim());
                None
            }
        })
        .collect()
}

/// Declarations and nested rules of a block, in source order
fn parse_body(input: &mut Parser<'_, '_>, declarations: bool) -> (Vec<Declaration>, Vec<CssRule>) {
    let mut rule_parser = RuleParser { declarations };
    let mut found = (Vec::new(), Vec::new());
    for item in RuleBodyParser::new(input, &mut rule_parser) {
        match item {
            Ok(BodyItem::Declaration(declaration)) => found.0.push(declaration),
            Ok(BodyItem::Rule(rule)) => found.1.push(rule),
            Err((_, slice)) => ::log::debug!("Dropping malformed CSS `{}`", slice.trim()),
        }
    }
    found
}

/// Declarations of a style or descriptor block. Nested rules are not kept.
fn parse_declaration_body(input: &mut Parser<'_, '_>) -> Vec<Declaration> {
    let (declarations, nested) = parse_body(input, true);
    if !nested.is_empty() {
        ::log::debug!("Dropping {} nested rules", nested.len());
    }
    declarations
}

/// Whitespace context of a token run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Selector,
    AtPrelude,
    Value,
}

impl Mode {
    fn no_space_after(self, c: char) -> bool {
        match self {
            Mode::Selector => matches!(c, ',' | '>' | '~' | '+' | '('),
            Mode::AtPrelude => matches!(c, ',' | ':' | '('),
            Mode::Value => matches!(c, ',' | ':' | '(' | '!'),
        }
    }

    fn no_space_before(self, c: char) -> bool {
        match self {
            Mode::Selector => matches!(c, ',' | '>' | '~' | '+' | ')'),
            Mode::AtPrelude => matches!(c, ',' | ':' | ')'),
            Mode::Value => matches!(c, ',' | ')' | '!'),
        }
    }
}

/// Serializes tokens, collapsing whitespace to a single space only where it
/// may be significant
struct Writer {
    out: String,
    pending_space: bool,
    mode: Mode,
    /// Set by tokens that make the run invalid (stray closers, bad strings and urls)
    malformed: bool,
    has_block: bool,
}

impl Writer {
    fn new(mode: Mode) -> Self {
        Self {
            out: String::new(),
            pending_space: false,
            mode,
            malformed: false,
            has_block: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    fn finish(self) -> String {
        self.out
    }

    fn push(&mut self, text: &str) {
        if std::mem::take(&mut self.pending_space) {
            let prev = self.out.chars().next_back();
            let next = text.chars().next();
            if let (Some(prev), Some(next)) = (prev, next) {
                if !self.mode.no_space_after(prev) && !self.mode.no_space_before(next) {
                    self.out.push(' ');
                }
            }
        }
        self.out.push_str(text);
    }

    fn write_token<'i, 't>(&mut self, parser: &mut Parser<'i, 't>, token: &Token<'i>) {
        match token {
            Token::WhiteSpace(_) => self.pending_space = true,
            Token::Comment(_) => {}
            Token::CloseCurlyBracket
            | Token::CloseParenthesis
            | Token::CloseSquareBracket
            | Token::BadUrl(_)
            | Token::BadString(_) => self.malformed = true,
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                let closing = match token {
                    Token::SquareBracketBlock => "]",
                    Token::CurlyBracketBlock => {
                        self.has_block = true;
                        "}"
                    }
                    _ => ")",
                };
                self.push(&token.to_css_string());
                let _ = parser.parse_nested_block(|p| {
                    self.write_all(p);
                    Ok::<_, CssParseError>(())
                });
                self.pending_space = false;
                self.out.push_str(closing);
            }
            _ => self.push(&token.to_css_string()),
        }
    }

    fn write_all<'i, 't>(&mut self, parser: &mut Parser<'i, 't>) {
        loop {
            let token = match parser.next_including_whitespace() {
                Ok(token) => token.clone(),
                Err(_) => break,
            };
            self.write_token(parser, &token);
        }
    }
}
