//! XML form of policy documents
//!
//! ```xml
//! <policy name="budget-policy" version="1.0">
//!   <composite name="formulas" combinator="and" severityWeight="2">
//!     <formula-complexity name="complexity"/>
//!     <dynamic name="large-values" condition="value &gt; 1000"/>
//!   </composite>
//! </policy>
//! ```

use super::{DefinitionError, PolicyDocument, RuleDefinition};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const ROOT: &str = "policy";

/// Parse an XML policy document
pub(super) fn parse_document(content: &str) -> Result<PolicyDocument, DefinitionError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let line_of = |pos: u64| {
        let bytes = content.as_bytes();
        bytes[..(pos as usize).min(bytes.len())]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    };

    let mut document: Option<PolicyDocument> = None;
    let mut root_closed = false;
    // Open rule elements; the last one receives the next child
    let mut stack: Vec<RuleDefinition> = Vec::new();
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf);
        let line = line_of(reader.buffer_position());
        match event {
            Ok(Event::Start(e)) => {
                reject_after_root(root_closed, &e, line)?;
                if document.is_none() {
                    document = Some(parse_root(&e, line)?);
                } else {
                    stack.push(parse_rule(&e, line)?);
                }
            }

            Ok(Event::Empty(e)) => {
                reject_after_root(root_closed, &e, line)?;
                if document.is_none() {
                    document = Some(parse_root(&e, line)?);
                    root_closed = true;
                } else if let Some(doc) = document.as_mut() {
                    let rule = parse_rule(&e, line)?;
                    attach(doc, &mut stack, rule);
                }
            }

            Ok(Event::End(_)) => match stack.pop() {
                Some(rule) => {
                    if let Some(doc) = document.as_mut() {
                        attach(doc, &mut stack, rule);
                    }
                }
                None => root_closed = true,
            },

            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| DefinitionError::Xml {
                    line,
                    message: err.to_string(),
                })?;
                if !text.trim().is_empty() {
                    return Err(DefinitionError::Xml {
                        line,
                        message: format!("unexpected text '{}'", text.trim()),
                    });
                }
            }

            Ok(Event::Eof) => {
                if let Some(open) = stack.last() {
                    return Err(DefinitionError::Xml {
                        line,
                        message: format!("unexpected end of document inside <{}>", open.kind),
                    });
                }
                if document.is_some() && !root_closed {
                    return Err(DefinitionError::Xml {
                        line,
                        message: format!("unexpected end of document inside <{}>", ROOT),
                    });
                }
                break;
            }

            Err(e) => {
                return Err(DefinitionError::Xml {
                    line,
                    message: e.to_string(),
                })
            }

            _ => {} // Skip comments, declarations, etc.
        }

        buf.clear();
    }

    document.ok_or_else(|| DefinitionError::Xml {
        line: 1,
        message: format!("missing <{}> root element", ROOT),
    })
}

/// Nothing may follow the root element
fn reject_after_root(
    root_closed: bool,
    e: &BytesStart<'_>,
    line: usize,
) -> Result<(), DefinitionError> {
    if root_closed {
        return Err(DefinitionError::Xml {
            line,
            message: format!("unexpected <{}> after </{}>", element_name(e), ROOT),
        });
    }
    Ok(())
}

fn attach(document: &mut PolicyDocument, stack: &mut [RuleDefinition], rule: RuleDefinition) {
    match stack.last_mut() {
        Some(parent) => parent.rules.push(rule),
        None => document.rules.push(rule),
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

/// Attribute (key, unescaped value) pairs of an element
fn attributes(e: &BytesStart<'_>, line: usize) -> Result<Vec<(String, String)>, DefinitionError> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| DefinitionError::Xml {
                line,
                message: err.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            let value = quick_xml::escape::unescape(&raw)
                .map_err(|err| DefinitionError::Xml {
                    line,
                    message: err.to_string(),
                })?
                .to_string();
            Ok((key, value))
        })
        .collect()
}

fn parse_root(e: &BytesStart<'_>, line: usize) -> Result<PolicyDocument, DefinitionError> {
    let name = element_name(e);
    if name != ROOT {
        return Err(DefinitionError::Xml {
            line,
            message: format!("expected <{}> root element, found <{}>", ROOT, name),
        });
    }

    let mut document = PolicyDocument::default();
    for (key, value) in attributes(e, line)? {
        match key.as_str() {
            "name" => document.name = value,
            "version" => document.version = value,
            _ => {
                return Err(DefinitionError::schema(
                    ROOT,
                    format!("unknown attribute '{}'", key),
                ))
            }
        }
    }
    Ok(document)
}

fn parse_rule(e: &BytesStart<'_>, line: usize) -> Result<RuleDefinition, DefinitionError> {
    let mut rule = RuleDefinition {
        kind: element_name(e),
        ..Default::default()
    };

    for (key, value) in attributes(e, line)? {
        match key.as_str() {
            "name" => rule.name = Some(value),
            "description" => rule.description = Some(value),
            "background" => rule.background = Some(value),
            "author" => rule.author = Some(value),
            "possibleSolution" => rule.possible_solution = Some(value),
            "type" => rule.rule_type = Some(value),
            "severityWeight" => {
                let weight = value.trim().parse::<f64>().map_err(|_| {
                    DefinitionError::schema(
                        &format!("<{}> line {}", rule.kind, line),
                        format!("invalid severityWeight '{}'", value),
                    )
                })?;
                rule.severity_weight = Some(weight);
            }
            "combinator" => rule.combinator = Some(value),
            "condition" => rule.condition = Some(value),
            "scope" => rule.scope = Some(value),
            "check" => rule.check = Some(value),
            _ => {
                return Err(DefinitionError::schema(
                    &format!("<{}> line {}", rule.kind, line),
                    format!("unknown attribute '{}'", key),
                ))
            }
        }
    }

    Ok(rule)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render a document as indented XML
pub(super) fn write_document(document: &PolicyDocument) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<{} name=\"{}\" version=\"{}\">\n",
        ROOT,
        escape_xml(&document.name),
        escape_xml(&document.version)
    ));
    for rule in &document.rules {
        write_rule(&mut xml, rule, 1);
    }
    xml.push_str(&format!("</{}>\n", ROOT));
    xml
}

fn write_rule(xml: &mut String, rule: &RuleDefinition, depth: usize) {
    let indent = "  ".repeat(depth);
    xml.push_str(&indent);
    xml.push('<');
    xml.push_str(&rule.kind);

    let weight = rule.severity_weight.map(|w| w.to_string());
    let attrs: [(&str, Option<&str>); 11] = [
        ("name", rule.name.as_deref()),
        ("type", rule.rule_type.as_deref()),
        ("severityWeight", weight.as_deref()),
        ("combinator", rule.combinator.as_deref()),
        ("check", rule.check.as_deref()),
        ("condition", rule.condition.as_deref()),
        ("scope", rule.scope.as_deref()),
        ("description", rule.description.as_deref()),
        ("background", rule.background.as_deref()),
        ("author", rule.author.as_deref()),
        ("possibleSolution", rule.possible_solution.as_deref()),
    ];
    for (key, value) in attrs {
        if let Some(value) = value {
            xml.push_str(&format!(" {}=\"{}\"", key, escape_xml(value)));
        }
    }

    if rule.rules.is_empty() {
        xml.push_str("/>\n");
        return;
    }

    xml.push_str(">\n");
    for sub in &rule.rules {
        write_rule(xml, sub, depth + 1);
    }
    xml.push_str(&format!("{}</{}>\n", indent, rule.kind));
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<policy name="budget" version="2.0">
  <!-- formulas -->
  <composite name="formulas" combinator="and" severityWeight="2">
    <formula-complexity name="complexity" possibleSolution="Split it"/>
    <dynamic name="large" condition="value &gt; 1000 &amp;&amp; row &lt; 5" scope="In*"/>
  </composite>
  <ref-to-null name="nulls"/>
</policy>
"#;

    #[test]
    fn test_parse_document() {
        let doc = parse_document(POLICY).unwrap();
        assert_eq!(doc.name, "budget");
        assert_eq!(doc.version, "2.0");
        assert_eq!(doc.rules.len(), 2);

        let composite = &doc.rules[0];
        assert_eq!(composite.kind, "composite");
        assert_eq!(composite.combinator.as_deref(), Some("and"));
        assert_eq!(composite.severity_weight, Some(2.0));
        assert_eq!(composite.rules.len(), 2);
        assert_eq!(
            composite.rules[0].possible_solution.as_deref(),
            Some("Split it")
        );
        assert_eq!(
            composite.rules[1].condition.as_deref(),
            Some("value > 1000 && row < 5")
        );
        assert_eq!(doc.rules[1].kind, "ref-to-null");
    }

    #[test]
    fn test_write_escapes_attributes() {
        let doc = PolicyDocument {
            name: "p".to_string(),
            rules: vec![RuleDefinition {
                kind: "dynamic".to_string(),
                condition: Some("value == \"a\" && row < 2".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let xml = write_document(&doc);
        assert!(xml.contains(
            "<dynamic condition=\"value == &quot;a&quot; &amp;&amp; row &lt; 2\"/>"
        ));
        assert_eq!(parse_document(&xml).unwrap(), doc);
    }

    #[test]
    fn test_wrong_root() {
        let err = parse_document("<rules><sanity/></rules>").unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));
    }

    #[test]
    fn test_unknown_attribute() {
        let err = parse_document("<policy><sanity colour=\"red\"/></policy>").unwrap_err();
        assert!(matches!(err, DefinitionError::SchemaViolation { .. }));
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_document("<policy><composite></policy>").unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));
    }

    #[test]
    fn test_truncated_document() {
        let err = parse_document(
            r#"<policy name="p"><composite name="c" combinator="and"><sanity name="s"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));

        let err = parse_document(r#"<policy name="p"><sanity name="s"/>"#).unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));
    }

    #[test]
    fn test_elements_after_root() {
        let err = parse_document(r#"<policy name="p"></policy><sanity name="stray"/>"#)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));

        let err = parse_document(r#"<policy name="p"/><sanity name="stray"/>"#).unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));
    }

    #[test]
    fn test_self_closing_root() {
        let doc = parse_document(r#"<policy name="empty"/>"#).unwrap();
        assert_eq!(doc.name, "empty");
        assert!(doc.rules.is_empty());
    }

    #[test]
    fn test_error_line_after_multibyte_text() {
        let err = parse_document("<policy name=\"Bücher\">\n<sanity/>\n<composite>\n</policy>")
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Xml { .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_document("").is_err());
    }
}
