//! Whitespace stripping.
//!
//! [`WhitespaceStripper`] decides per element whether whitespace-only text
//! children are significant. Inputs, highest precedence first:
//!
//! 1. whole-document preserve ([`StripSpace::None`]),
//! 2. `CannotStrip` for elements whose type has simple content,
//! 3. `PreserveParent` inherited from `xml:space="preserve"`,
//! 4. strip from [`StripSpace::All`] or a rule-matcher strip result,
//! 5. default: preserve.
//!
//! Only complete whitespace-only text events are ever dropped.

use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

use crate::context::{Condition, PipelineContext};
use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::event::Event;
use crate::pipeline::{Next, Receiver};
use crate::qname::QName;

/// XML whitespace: space, tab, CR, LF. Empty text counts as whitespace.
pub fn is_xml_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

/// Result of matching an element name against the strip/preserve rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceRule {
    Preserve,
    Strip,
    NoRule,
}

/// External rule matcher: element name → strip decision.
pub trait SpaceRuleMatcher {
    fn rule_for(&self, name: &QName) -> SpaceRule;
}

/// Whole-document stripping policy.
#[derive(Clone, Default)]
pub enum StripSpace {
    /// Nothing is stripped (short-circuits all rules).
    #[default]
    None,
    /// Every element strips whitespace-only text, subject to `xml:space` and
    /// simple-content protection.
    All,
    /// Ask a rule matcher per element.
    Rules(Rc<dyn SpaceRuleMatcher>),
}

impl fmt::Debug for StripSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::All => f.write_str("All"),
            Self::Rules(_) => f.write_str("Rules(..)"),
        }
    }
}

/// Name test of a strip/preserve rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `{uri}*`
    Namespace(String),
    /// `*:local`
    Local(String),
    /// `{uri}local` or `local`
    Name(QName),
}

impl NameTest {
    /// Parses `*`, `{uri}*`, `*:local`, `{uri}local` or `local`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == "*" {
            return Self::Any;
        }
        if let Some(local) = s.strip_prefix("*:") {
            return Self::Local(local.to_owned());
        }
        if let Some(rest) = s.strip_prefix('{')
            && let Some(close) = rest.find('}')
            && &rest[close + 1..] == "*"
        {
            return Self::Namespace(rest[..close].to_owned());
        }
        Self::Name(QName::from_clark(s))
    }

    fn matches(&self, name: &QName) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(uri) => *name.uri == **uri,
            Self::Local(local) => *name.local == **local,
            Self::Name(q) => q.same_expanded_name(name),
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Self::Any => 0,
            Self::Namespace(_) | Self::Local(_) => 1,
            Self::Name(_) => 2,
        }
    }
}

/// Rule matcher over name tests, in the manner of `xsl:strip-space` /
/// `xsl:preserve-space`: the most specific test wins, later rules win ties.
#[derive(Debug, Clone, Default)]
pub struct NameTestRules {
    rules: Vec<(NameTest, SpaceRule)>,
}

impl NameTestRules {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strip(mut self, test: &str) -> Self {
        self.rules.push((NameTest::parse(test), SpaceRule::Strip));
        self
    }

    #[must_use]
    pub fn preserve(mut self, test: &str) -> Self {
        self.rules.push((NameTest::parse(test), SpaceRule::Preserve));
        self
    }
}

impl SpaceRuleMatcher for NameTestRules {
    fn rule_for(&self, name: &QName) -> SpaceRule {
        let mut best: Option<(u8, SpaceRule)> = None;
        for (test, rule) in &self.rules {
            if !test.matches(name) {
                continue;
            }
            let p = test.priority();
            if best.is_none_or(|(bp, _)| p >= bp) {
                best = Some((p, *rule));
            }
        }
        best.map_or(SpaceRule::NoRule, |(_, rule)| rule)
    }
}

/// Per-element decision flags.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct StripFlags(u8);

impl StripFlags {
    pub const ALWAYS_PRESERVE: Self = Self(1);
    pub const ALWAYS_STRIP: Self = Self(2);
    pub const PRESERVE_PARENT: Self = Self(4);
    pub const CANNOT_STRIP: Self = Self(8);
    /// The rule matcher asked for stripping.
    pub const STRIP: Self = Self(16);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }

    /// Whether whitespace-only text would be stripped if nothing protected it.
    fn wants_strip(self) -> bool {
        !self.contains(Self::ALWAYS_PRESERVE)
            && !self.contains(Self::PRESERVE_PARENT)
            && (self.contains(Self::ALWAYS_STRIP) || self.contains(Self::STRIP))
    }
}

impl BitOr for StripFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for StripFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = ["ALWAYS_PRESERVE", "ALWAYS_STRIP", "PRESERVE_PARENT", "CANNOT_STRIP", "STRIP"];
        let set: Vec<&str> = names
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, n)| *n)
            .collect();
        write!(f, "StripFlags({})", set.join("|"))
    }
}

pub struct WhitespaceStripper {
    next: Next,
    ctx: Rc<PipelineContext>,
    mode: StripSpace,
    /// Entscheidungs-Stack; Eintrag 0 ist die Dokumentebene.
    stack: Vec<StripFlags>,
}

impl WhitespaceStripper {
    pub fn new(next: Next, mode: StripSpace) -> Self {
        let root = match mode {
            StripSpace::None => StripFlags::ALWAYS_PRESERVE,
            StripSpace::All => StripFlags::ALWAYS_STRIP,
            StripSpace::Rules(_) => StripFlags::default(),
        };
        Self { next, ctx: Rc::default(), mode, stack: vec![root] }
    }

    /// Flags of the innermost open element (document level when none is open).
    pub fn current(&self) -> StripFlags {
        self.stack.last().copied().unwrap_or_default()
    }

    fn element_flags(&self, name: &QName, simple_content: bool) -> StripFlags {
        let parent = self.current();
        if parent.contains(StripFlags::ALWAYS_PRESERVE) {
            return StripFlags::ALWAYS_PRESERVE;
        }
        let mut flags = StripFlags::default();
        flags.set(StripFlags::PRESERVE_PARENT, parent.contains(StripFlags::PRESERVE_PARENT));
        match &self.mode {
            StripSpace::None => flags.set(StripFlags::ALWAYS_PRESERVE, true),
            StripSpace::All => flags.set(StripFlags::ALWAYS_STRIP, true),
            StripSpace::Rules(matcher) => {
                flags.set(StripFlags::STRIP, matcher.rule_for(name) == SpaceRule::Strip);
            }
        }
        flags.set(StripFlags::CANNOT_STRIP, simple_content);
        flags
    }
}

impl Receiver for WhitespaceStripper {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::StartElement { name, type_annotation, .. } => {
                // Unknown/Untyped umgehen die Simple-Content-Pruefung.
                let flags = self.element_flags(name, type_annotation.is_simple_content());
                self.stack.push(flags);
            }
            Event::Attribute { name, value, .. } if name.is_xml_space() => {
                if let Some(top) = self.stack.last_mut() {
                    match value.trim() {
                        "preserve" => top.set(StripFlags::PRESERVE_PARENT, true),
                        "default" => top.set(StripFlags::PRESERVE_PARENT, false),
                        _ => {}
                    }
                }
            }
            Event::EndElement => {
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
            }
            Event::Characters { text, location, .. } if is_xml_whitespace(text) => {
                let flags = self.current();
                if flags.wants_strip() {
                    if !flags.contains(StripFlags::CANNOT_STRIP) {
                        return Ok(());
                    }
                    self.ctx.report(
                        Diagnostic::error(
                            Condition::StripSimpleContent.code(self.ctx.host_language()),
                            "whitespace in an element with simple content cannot be stripped; preserved",
                        )
                        .at(location),
                    );
                }
            }
            _ => {}
        }
        self.next.process(event)
    }

    fn close(&mut self) -> Result<()> {
        self.next.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::event::{OwnedEvent, TypeAnnotation};
    use crate::location::LocationId;
    use crate::pipeline::{CollectedEvents, EventCollector};
    use crate::properties::Properties;

    fn stripper(mode: StripSpace) -> (WhitespaceStripper, CollectedEvents, Rc<CollectingDiagnostics>) {
        let (sink, events) = EventCollector::shared();
        let diags = Rc::new(CollectingDiagnostics::new());
        let ctx = PipelineContext::default().with_diagnostics(diags.clone());
        let mut s = WhitespaceStripper::new(Box::new(sink), mode);
        s.set_pipeline_context(&Rc::new(ctx));
        (s, events, diags)
    }

    fn texts(events: &CollectedEvents) -> Vec<String> {
        events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                OwnedEvent::Characters { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn open(s: &mut WhitespaceStripper, name: &QName) {
        s.process(Event::start_element(name)).unwrap();
        s.process(Event::StartContent).unwrap();
    }

    #[test]
    fn whitespace_erkennung() {
        assert!(is_xml_whitespace(" \t\r\n"));
        assert!(is_xml_whitespace(""));
        assert!(!is_xml_whitespace(" x "));
        assert!(!is_xml_whitespace("\u{a0}"));
    }

    #[test]
    fn strip_all_entfernt_nur_reinen_whitespace() {
        let (mut s, events, _) = stripper(StripSpace::All);
        let root = QName::local("root");
        open(&mut s, &root);
        s.process(Event::characters("\n  ")).unwrap();
        s.process(Event::characters(" mixed ")).unwrap();
        s.process(Event::EndElement).unwrap();
        assert_eq!(texts(&events), vec![" mixed ".to_string()]);
    }

    #[test]
    fn xml_space_preserve_wird_vererbt_und_aufgehoben() {
        let (mut s, events, _) = stripper(StripSpace::All);
        let root = QName::local("root");
        let inner = QName::local("inner");
        let space = QName::xml("space");
        s.process(Event::start_element(&root)).unwrap();
        s.process(Event::attribute(&space, "preserve")).unwrap();
        s.process(Event::StartContent).unwrap();
        s.process(Event::characters(" a ")).unwrap();
        open(&mut s, &inner);
        s.process(Event::characters(" ")).unwrap();
        s.process(Event::EndElement).unwrap();
        s.process(Event::start_element(&inner)).unwrap();
        s.process(Event::attribute(&space, "default")).unwrap();
        s.process(Event::StartContent).unwrap();
        s.process(Event::characters("  ")).unwrap();
        s.process(Event::EndElement).unwrap();
        s.process(Event::EndElement).unwrap();
        assert_eq!(texts(&events), vec![" a ".to_string(), " ".to_string()]);
    }

    #[test]
    fn simple_content_ist_behebbarer_fehler() {
        let (mut s, events, diags) = stripper(StripSpace::All);
        let price = QName::local("price");
        s.process(Event::StartElement {
            name: &price,
            type_annotation: TypeAnnotation::Simple,
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        })
        .unwrap();
        s.process(Event::StartContent).unwrap();
        s.process(Event::characters("  ")).unwrap();
        s.process(Event::EndElement).unwrap();
        assert_eq!(texts(&events), vec!["  ".to_string()]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.diagnostics()[0].code, "SXWN9016");
    }

    #[test]
    fn unknown_type_umgeht_simple_content_pruefung() {
        let (mut s, events, diags) = stripper(StripSpace::All);
        let e = QName::local("e");
        s.process(Event::StartElement {
            name: &e,
            type_annotation: TypeAnnotation::Unknown,
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        })
        .unwrap();
        s.process(Event::StartContent).unwrap();
        s.process(Event::characters(" ")).unwrap();
        assert!(texts(&events).is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn strip_none_behaelt_alles() {
        let (mut s, events, _) = stripper(StripSpace::None);
        let root = QName::local("root");
        let space = QName::xml("space");
        s.process(Event::start_element(&root)).unwrap();
        s.process(Event::attribute(&space, "default")).unwrap();
        s.process(Event::StartContent).unwrap();
        s.process(Event::characters("\n")).unwrap();
        assert_eq!(texts(&events), vec!["\n".to_string()]);
        assert!(s.current().contains(StripFlags::ALWAYS_PRESERVE));
    }

    #[test]
    fn regeln_mit_spezifitaet() {
        let rules = NameTestRules::new().strip("*").preserve("pre").preserve("{urn:keep}*");
        assert_eq!(rules.rule_for(&QName::local("div")), SpaceRule::Strip);
        assert_eq!(rules.rule_for(&QName::local("pre")), SpaceRule::Preserve);
        assert_eq!(rules.rule_for(&QName::new("urn:keep", "x")), SpaceRule::Preserve);
        assert_eq!(NameTestRules::new().rule_for(&QName::local("x")), SpaceRule::NoRule);

        let (mut s, events, _) = stripper(StripSpace::Rules(Rc::new(rules)));
        let div = QName::local("div");
        let pre = QName::local("pre");
        open(&mut s, &div);
        s.process(Event::characters(" ")).unwrap();
        open(&mut s, &pre);
        s.process(Event::characters("  ")).unwrap();
        assert_eq!(texts(&events), vec!["  ".to_string()]);
    }

    #[test]
    fn name_test_parse() {
        assert_eq!(NameTest::parse("*"), NameTest::Any);
        assert_eq!(NameTest::parse("*:p"), NameTest::Local("p".into()));
        assert_eq!(NameTest::parse("{urn:a}*"), NameTest::Namespace("urn:a".into()));
        assert_eq!(NameTest::parse("{urn:a}p"), NameTest::Name(QName::new("urn:a", "p")));
    }
}
