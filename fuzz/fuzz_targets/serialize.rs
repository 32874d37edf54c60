#![no_main]
use libfuzzer_sys::fuzz_target;
use xser::{OutputMethod, OutputProperties, Serializer, StripSpace};

fuzz_target!(|data: &[u8]| {
    if let Ok(xml) = std::str::from_utf8(data) {
        for method in [OutputMethod::Xml, OutputMethod::Html, OutputMethod::Xhtml, OutputMethod::Text] {
            let props = OutputProperties::default().with_method(method).with_indent(true);
            let _ = Serializer::new(props).serialize_xml_str(xml);
        }
        let _ = Serializer::default().with_strip_space(StripSpace::All).serialize_xml_str(xml);
    }
});
