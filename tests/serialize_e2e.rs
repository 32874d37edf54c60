//! Integrationstests: XML parsen, durch die Pipeline schicken, Ergebnis pruefen.

use std::rc::Rc;

use xser::namespace::NamespaceReducer;
use xser::pipeline::{EventCollector, drive};
use xser::whitespace::NameTestRules;
use xser::{
    CharacterMap, CollectingDiagnostics, Destination, OutputMethod, OutputProperties, OwnedEvent,
    PipelineContext, QName, Serializer, StripSpace,
};

// ============================================================================
// Hilfsfunktionen
// ============================================================================

fn xml_props() -> OutputProperties {
    OutputProperties::default().with_method(OutputMethod::Xml).with_omit_xml_declaration(true)
}

fn serialize(props: OutputProperties, xml: &str) -> String {
    Serializer::new(props).serialize_xml_str(xml).expect("serialize")
}

fn reduce(events: &[OwnedEvent]) -> Vec<OwnedEvent> {
    let (collector, out) = EventCollector::shared();
    let mut reducer = NamespaceReducer::new(Box::new(collector));
    drive(events, &mut reducer, &Rc::new(PipelineContext::default())).expect("reduce");
    out.take()
}

/// Vergleicht zwei Dokumente auf Infoset-Ebene (Namen, Attribute, Text).
fn assert_same_tree(expected: &str, actual: &str) {
    let a = roxmltree::Document::parse(expected).expect("parse expected");
    let b = roxmltree::Document::parse(actual).expect("parse actual");
    let nodes_a: Vec<_> = a.descendants().collect();
    let nodes_b: Vec<_> = b.descendants().collect();
    assert_eq!(nodes_a.len(), nodes_b.len(), "{actual}");
    for (x, y) in nodes_a.iter().zip(&nodes_b) {
        assert_eq!(x.node_type(), y.node_type());
        assert_eq!(x.tag_name(), y.tag_name());
        assert_eq!(x.text(), y.text());
        let attrs_x: Vec<_> = x.attributes().map(|at| (at.namespace(), at.name(), at.value())).collect();
        let attrs_y: Vec<_> = y.attributes().map(|at| (at.namespace(), at.name(), at.value())).collect();
        assert_eq!(attrs_x, attrs_y);
    }
}

// ============================================================================
// Namespaces
// ============================================================================

#[test]
fn reducer_ist_idempotent() {
    let events = vec![
        OwnedEvent::StartDocument,
        OwnedEvent::start_element(QName::with_prefix("urn:a", "root", "a")),
        OwnedEvent::namespace("a", "urn:a"),
        OwnedEvent::namespace("a", "urn:a"),
        OwnedEvent::attribute(QName::with_prefix("urn:b", "x", "a"), "1"),
        OwnedEvent::StartContent,
        OwnedEvent::start_element(QName::with_prefix("urn:a", "child", "a")),
        OwnedEvent::namespace("a", "urn:a"),
        OwnedEvent::StartContent,
        OwnedEvent::EndElement,
        OwnedEvent::EndElement,
        OwnedEvent::EndDocument,
    ];
    let once = reduce(&events);
    let twice = reduce(&once);
    assert_eq!(once, twice);

    let declarations =
        once.iter().filter(|e| matches!(e, OwnedEvent::Namespace { .. })).count();
    // a fuer das Element, ein synthetisches Praefix fuer das Attribut
    assert_eq!(declarations, 2);
}

#[test]
fn redundante_deklarationen_verschwinden() {
    let xml = r#"<a:r xmlns:a="urn:a"><a:c xmlns:a="urn:a"><d xmlns="">t</d></a:c></a:r>"#;
    assert_eq!(serialize(xml_props(), xml), r#"<a:r xmlns:a="urn:a"><a:c><d>t</d></a:c></a:r>"#);
}

#[test]
fn roundtrip_erhaelt_infoset() {
    let xml = concat!(
        r#"<doc xmlns="urn:d" xmlns:x="urn:x" x:id="7">"#,
        r#"<x:item a="&lt;&amp;&quot;">1 &lt; 2</x:item>"#,
        r#"<empty/><!--note--><?pi data?>"#,
        r#"<mixed>a<b>b</b>c</mixed>"#,
        "</doc>"
    );
    let out = serialize(OutputProperties::default(), xml);
    assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"), "{out}");
    assert_same_tree(xml, &out);
}

// ============================================================================
// Whitespace
// ============================================================================

#[test]
fn strip_all_entfernt_nur_leerraum() {
    let xml = "<r>\n  <a> x </a>\n  <b xml:space=\"preserve\">  </b>\n</r>";
    let out = Serializer::new(xml_props())
        .with_strip_space(StripSpace::All)
        .serialize_xml_str(xml)
        .unwrap();
    assert_eq!(out, "<r><a> x </a><b xml:space=\"preserve\">  </b></r>");
}

#[test]
fn strip_regeln_nach_namen() {
    let rules = NameTestRules::new().strip("*").preserve("pre");
    let xml = "<r> <pre> </pre> <q> </q></r>";
    let out = Serializer::new(xml_props())
        .with_strip_space(StripSpace::Rules(Rc::new(rules)))
        .serialize_xml_str(xml)
        .unwrap();
    assert_eq!(out, "<r><pre> </pre><q/></r>");
}

// ============================================================================
// Methoden-Aushandlung
// ============================================================================

#[test]
fn html_wurzel_waehlt_html_und_spielt_puffer_ab() {
    let props = OutputProperties::default().with_indent(false);
    let xml = "<!--c--><?pi x?><html><body><p>a<br/>b</p></body></html>";
    assert_eq!(
        serialize(props, xml),
        "<!--c--><?pi x><!DOCTYPE html>\n<html><body><p>a<br>b</p></body></html>"
    );
}

#[test]
fn xhtml_wurzel_waehlt_xhtml() {
    let xml = r#"<!--c--><html xmlns="http://www.w3.org/1999/xhtml"><body><br/></body></html>"#;
    let (dest, text) = Destination::string();
    let recorded = Serializer::default().serialize_xml(xml.as_bytes(), dest).unwrap();
    assert_eq!(recorded.method(), Some(&OutputMethod::Xhtml));
    assert_eq!(
        text.take(),
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><!--c--><!DOCTYPE html>\n",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\"><body><br /></body></html>"
        )
    );
}

#[test]
fn andere_wurzel_waehlt_xml() {
    let (dest, _) = Destination::string();
    let recorded = Serializer::default().serialize_xml("<root/>".as_bytes(), dest).unwrap();
    assert_eq!(recorded.method(), Some(&OutputMethod::Xml));
}

// ============================================================================
// Einrueckung, Encoding, Character Maps
// ============================================================================

#[test]
fn xml_einrueckung() {
    let out = serialize(xml_props().with_indent(true), "<a><b>x</b><c/></a>");
    assert_eq!(out, "<a>\n  <b>x</b>\n  <c/>\n</a>");
}

#[test]
fn einrueckung_aendert_kein_infoset_ausser_leerraum() {
    let xml = "<a><b>x<i>y</i>z</b><c><d/></c></a>";
    let out = serialize(xml_props().with_indent(true), xml);
    let stripped = Serializer::new(xml_props())
        .with_strip_space(StripSpace::All)
        .serialize_xml_str(&out)
        .unwrap();
    assert_eq!(stripped, xml);
}

#[test]
fn latin1_schreibt_zeichenreferenzen() {
    let props = xml_props().with_encoding("ISO-8859-1");
    let (dest, bytes) = Destination::buffer();
    Serializer::new(props).serialize_xml("<a>\u{e9}\u{20ac}</a>".as_bytes(), dest).unwrap();
    assert_eq!(&*bytes.borrow(), b"<a>\xE9&#x20AC;</a>");
}

#[test]
fn unbekanntes_encoding_meldet_genau_einmal() {
    let sink = Rc::new(CollectingDiagnostics::new());
    let props = OutputProperties::default().with_encoding("x-unknown");
    let (dest, text) = Destination::string();
    let recorded = Serializer::new(props)
        .with_diagnostics(sink.clone())
        .serialize_xml("<a>1</a>".as_bytes(), dest)
        .unwrap();
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.diagnostics()[0].code, "SESU0007");
    assert_eq!(recorded.encoding(), "UTF-8");
    assert_eq!(text.take(), "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a>1</a>");
}

#[test]
fn character_map_ersetzt_ohne_escaping() {
    let map = CharacterMap::new().with('\u{a0}', "&nbsp;");
    let props = xml_props().with_character_map("m", map);
    let out = serialize(props, "<a t=\"x\u{a0}\">1\u{a0}&amp;</a>");
    assert_eq!(out, "<a t=\"x&nbsp;\">1&nbsp;&amp;</a>");
}

#[test]
fn text_methode_schreibt_nur_text() {
    let props = OutputProperties::default().with_method(OutputMethod::Text);
    assert_eq!(serialize(props, "<a>1 &lt; <b>2</b><!--x--></a>"), "1 < 2");
}

#[test]
fn fehlerhaftes_xml_liefert_position() {
    let err = Serializer::default().serialize_xml_str("<a>\n<b></a>").unwrap_err();
    assert!(matches!(err, xser::Error::XmlParseError(_)), "{err}");
}
