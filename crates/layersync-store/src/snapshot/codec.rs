//! XML snapshot codec
//!
//! One entity per file:
//!
//! ```xml
//! <Entity Type="content" Key="k1" Alias="Home" Level="0" SortOrder="0" Trashed="false">
//!   <Dependencies>
//!     <Dependency Key="k0" />
//!   </Dependencies>
//!   <Fields>
//!     <Field Name="title">Welcome</Field>
//!   </Fields>
//!   <References>
//!     <Reference Name="template" Key="t1" />
//!   </References>
//! </Entity>
//! ```
//!
//! Tombstones are a single `<Empty Type Key Alias Parent Change/>` element.

#![allow(clippy::result_large_err)]

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use layersync_core::model::{MarkerKind, SnapshotDocument};

use crate::errors::{io_error, snapshot_parse, Result};

const ENTITY: &str = "Entity";
const TOMBSTONE: &str = "Empty";

/// Parse snapshot XML. `path` is only used for error context.
///
/// # Errors
///
/// Returns `ExErrorKind::InvalidSnapshot` for malformed XML, an unknown root
/// element, or missing identity attributes.
pub fn parse_document(xml: &str, path: &Path) -> Result<SnapshotDocument> {
    let mut reader = Reader::from_str(xml);

    let mut document: Option<SnapshotDocument> = None;
    let mut current_field: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                if document.is_none() {
                    document = Some(parse_root(&e, &name, path)?);
                } else if name == "Field" {
                    let attrs = attributes(&e, path)?;
                    current_field = Some((required(&attrs, "Name", path)?, String::new()));
                } else if let Some(doc) = document.as_mut() {
                    apply_child(doc, &e, &name, path)?;
                }
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(&e);
                if document.is_none() {
                    document = Some(parse_root(&e, &name, path)?);
                } else if let Some(doc) = document.as_mut() {
                    apply_child(doc, &e, &name, path)?;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, value)) = current_field.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| snapshot_parse(path, err.to_string()))?;
                    value.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((_, value)) = current_field.as_mut() {
                    let bytes = e.into_inner();
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|err| snapshot_parse(path, err.to_string()))?;
                    value.push_str(text);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Field" {
                    if let (Some(doc), Some((name, value))) =
                        (document.as_mut(), current_field.take())
                    {
                        doc.fields.insert(name, value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(snapshot_parse(path, format!("XML parse error: {e}")));
            }
            _ => {}
        }
    }

    document.ok_or_else(|| snapshot_parse(path, "no root element"))
}

/// Read and parse one snapshot file.
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if the file cannot be read, otherwise the
/// errors of `parse_document`.
pub fn read_document(path: &Path) -> Result<SnapshotDocument> {
    let xml = fs::read_to_string(path).map_err(|e| io_error("read_snapshot", path, e))?;
    parse_document(&xml, path)
}

/// Render a document as indented XML. Output is stable for equal documents.
///
/// # Errors
///
/// Returns `ExErrorKind::Serialization` if the writer fails.
pub fn render_document(document: &SnapshotDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    if let Some(marker) = document.marker {
        let mut root = BytesStart::new(TOMBSTONE);
        root.push_attribute(("Type", document.entity_type.as_str()));
        root.push_attribute(("Key", document.key.as_str()));
        root.push_attribute(("Alias", document.alias.as_str()));
        if let Some(parent) = &document.parent_key {
            root.push_attribute(("Parent", parent.as_str()));
        }
        root.push_attribute(("Change", marker.as_str()));
        write(&mut writer, Event::Empty(root))?;
        return finish(writer);
    }

    let level = document.level.to_string();
    let sort_order = document.sort_order.to_string();
    let mut root = BytesStart::new(ENTITY);
    root.push_attribute(("Type", document.entity_type.as_str()));
    root.push_attribute(("Key", document.key.as_str()));
    root.push_attribute(("Alias", document.alias.as_str()));
    root.push_attribute(("Level", level.as_str()));
    root.push_attribute(("SortOrder", sort_order.as_str()));
    if let Some(parent) = &document.parent_key {
        root.push_attribute(("Parent", parent.as_str()));
    }
    root.push_attribute(("Trashed", if document.trashed { "true" } else { "false" }));
    write(&mut writer, Event::Start(root))?;

    write(&mut writer, Event::Start(BytesStart::new("Dependencies")))?;
    for dep in &document.dependencies {
        let mut e = BytesStart::new("Dependency");
        e.push_attribute(("Key", dep.as_str()));
        write(&mut writer, Event::Empty(e))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("Dependencies")))?;

    write(&mut writer, Event::Start(BytesStart::new("Fields")))?;
    for (name, value) in &document.fields {
        let mut e = BytesStart::new("Field");
        e.push_attribute(("Name", name.as_str()));
        if value.is_empty() {
            write(&mut writer, Event::Empty(e))?;
        } else {
            write(&mut writer, Event::Start(e))?;
            write(&mut writer, Event::Text(BytesText::new(value)))?;
            write(&mut writer, Event::End(BytesEnd::new("Field")))?;
        }
    }
    write(&mut writer, Event::End(BytesEnd::new("Fields")))?;

    write(&mut writer, Event::Start(BytesStart::new("References")))?;
    for (name, target) in &document.references {
        let mut e = BytesStart::new("Reference");
        e.push_attribute(("Name", name.as_str()));
        e.push_attribute(("Key", target.as_str()));
        write(&mut writer, Event::Empty(e))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("References")))?;

    write(&mut writer, Event::End(BytesEnd::new(ENTITY)))?;
    finish(writer)
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| {
        layersync_core::ExError::new(layersync_core::ExErrorKind::Serialization)
            .with_op("render_snapshot")
            .with_message(e.to_string())
    })
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String> {
    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| {
        layersync_core::ExError::new(layersync_core::ExErrorKind::Serialization)
            .with_op("render_snapshot")
            .with_message(e.to_string())
    })?;
    xml.push('\n');
    Ok(xml)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>, path: &Path) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| snapshot_parse(path, err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| snapshot_parse(path, err.to_string()))?;
        attrs.insert(key, value.into_owned());
    }
    Ok(attrs)
}

fn required(attrs: &HashMap<String, String>, name: &str, path: &Path) -> Result<String> {
    match attrs.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(snapshot_parse(path, format!("missing {name} attribute"))),
    }
}

fn parse_int(attrs: &HashMap<String, String>, name: &str, path: &Path) -> Result<i32> {
    match attrs.get(name) {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| snapshot_parse(path, format!("{name} is not an integer: {raw}"))),
    }
}

fn parse_root(e: &BytesStart<'_>, name: &str, path: &Path) -> Result<SnapshotDocument> {
    let attrs = attributes(e, path)?;
    let entity_type = required(&attrs, "Type", path)?;
    let key = required(&attrs, "Key", path)?;
    let alias = attrs.get("Alias").cloned().unwrap_or_else(|| key.clone());
    let parent_key = attrs.get("Parent").filter(|p| !p.is_empty()).cloned();

    match name {
        ENTITY => {
            let mut doc = SnapshotDocument::new(entity_type, key, alias);
            doc.parent_key = parent_key;
            doc.level = parse_int(&attrs, "Level", path)?;
            doc.sort_order = parse_int(&attrs, "SortOrder", path)?;
            doc.trashed = attrs
                .get("Trashed")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            Ok(doc)
        }
        TOMBSTONE => {
            let change = required(&attrs, "Change", path)?;
            let marker = MarkerKind::parse(&change)
                .ok_or_else(|| snapshot_parse(path, format!("unknown Change: {change}")))?;
            Ok(SnapshotDocument::tombstone(
                entity_type,
                key,
                alias,
                parent_key,
                marker,
            ))
        }
        other => Err(snapshot_parse(path, format!("unexpected root element <{other}>"))),
    }
}

fn apply_child(doc: &mut SnapshotDocument, e: &BytesStart<'_>, name: &str, path: &Path) -> Result<()> {
    match name {
        "Dependency" => {
            let attrs = attributes(e, path)?;
            doc.dependencies.push(required(&attrs, "Key", path)?);
        }
        "Field" => {
            let attrs = attributes(e, path)?;
            doc.fields.insert(required(&attrs, "Name", path)?, String::new());
        }
        "Reference" => {
            let attrs = attributes(e, path)?;
            doc.references
                .insert(required(&attrs, "Name", path)?, required(&attrs, "Key", path)?);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> &'static Path {
        Path::new("/snap/content/home.config")
    }

    #[test]
    fn test_parse_entity() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<Entity Type="content" Key="k1" Alias="Home" Level="1" SortOrder="3" Parent="p1" Trashed="false">
  <Dependencies>
    <Dependency Key="d1" />
  </Dependencies>
  <Fields>
    <Field Name="title">Fish &amp; Chips</Field>
    <Field Name="empty" />
  </Fields>
  <References>
    <Reference Name="template" Key="t1" />
  </References>
</Entity>"#;

        let doc = parse_document(xml, path()).unwrap();
        assert_eq!(doc.key, "k1");
        assert_eq!(doc.parent_key.as_deref(), Some("p1"));
        assert_eq!(doc.level, 1);
        assert_eq!(doc.sort_order, 3);
        assert_eq!(doc.dependencies, vec!["d1".to_string()]);
        assert_eq!(doc.fields.get("title").map(String::as_str), Some("Fish & Chips"));
        assert_eq!(doc.fields.get("empty").map(String::as_str), Some(""));
        assert_eq!(doc.references.get("template").map(String::as_str), Some("t1"));
        assert!(!doc.is_tombstone());
    }

    #[test]
    fn test_parse_tombstone() {
        let xml = r#"<Empty Type="content" Key="k9" Alias="Old" Change="Delete" />"#;

        let doc = parse_document(xml, path()).unwrap();
        assert_eq!(doc.marker, Some(MarkerKind::Delete));
        assert_eq!(doc.key, "k9");
    }

    #[test]
    fn test_missing_key_is_invalid() {
        let err = parse_document(r#"<Entity Type="content" Alias="Home" />"#, path()).unwrap_err();
        assert_eq!(err.kind(), layersync_core::ExErrorKind::InvalidSnapshot);
        assert!(err.message().contains("Key"));
    }

    #[test]
    fn test_unknown_root_is_invalid() {
        let err = parse_document(r#"<Page Type="content" Key="k1" />"#, path()).unwrap_err();
        assert_eq!(err.kind(), layersync_core::ExErrorKind::InvalidSnapshot);
    }

    #[test]
    fn test_malformed_xml_is_invalid() {
        let err = parse_document("<Entity Type=\"content\" Key=\"k1\"><Fields></Entity>", path())
            .unwrap_err();
        assert_eq!(err.kind(), layersync_core::ExErrorKind::InvalidSnapshot);
    }

    #[test]
    fn test_render_then_parse_preserves_content() {
        let mut doc = SnapshotDocument::new("content", "k1", "Home <main>");
        doc.parent_key = Some("root".to_string());
        doc.level = 2;
        doc.trashed = true;
        doc.fields.insert("body".into(), "  line one\nline two  ".into());
        doc.fields.insert("blank".into(), String::new());
        doc.references.insert("template".into(), "t1".into());

        let xml = render_document(&doc).unwrap();
        assert_eq!(parse_document(&xml, path()).unwrap(), doc);
    }

    #[test]
    fn test_render_is_stable() {
        let marker = SnapshotDocument::clean_marker("content", Some("p1"), Some("Parent"));
        assert_eq!(
            render_document(&marker).unwrap(),
            render_document(&marker.clone()).unwrap()
        );
        assert!(render_document(&marker).unwrap().contains("Change=\"Clean\""));
    }
}
