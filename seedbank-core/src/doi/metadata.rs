//! Rendering of the descriptive metadata document.
//!
//! Produces a DataCite-flavored XML resource: titles, creators with their
//! scheme-qualified name identifiers, dates, descriptions, rights and the
//! related/alternate identifier sets. The document is sent to the DOI
//! service and persisted as the reserved `metadata.xml` blob inside the
//! package directory.

use crate::error::{Result, SeedbankError};
use crate::model::{DataPackage, RelationType};
use chrono::Datelike;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const KERNEL_NAMESPACE: &str = "http://datacite.org/schema/kernel-4";

pub fn render_metadata(pkg: &DataPackage) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut resource = BytesStart::new("resource");
    resource.push_attribute(("xmlns", KERNEL_NAMESPACE));
    writer.write_event(Event::Start(resource))?;

    let mut identifier = BytesStart::new("identifier");
    identifier.push_attribute(("identifierType", "DOI"));
    writer.write_event(Event::Start(identifier))?;
    if let Some(doi) = &pkg.doi {
        writer.write_event(Event::Text(BytesText::new(&doi.to_string())))?;
    }
    writer.write_event(Event::End(BytesEnd::new("identifier")))?;

    writer.write_event(Event::Start(BytesStart::new("creators")))?;
    for creator in &pkg.creators {
        writer.write_event(Event::Start(BytesStart::new("creator")))?;
        write_text_element(&mut writer, "creatorName", &creator.name)?;
        if let (Some(identifier), Some(scheme)) =
            (&creator.identifier, &creator.identifier_scheme)
        {
            let mut element = BytesStart::new("nameIdentifier");
            element.push_attribute(("nameIdentifierScheme", scheme.as_str()));
            if let Some(uri) = scheme.scheme_uri() {
                element.push_attribute(("schemeURI", uri));
            }
            writer.write_event(Event::Start(element))?;
            writer.write_event(Event::Text(BytesText::new(identifier)))?;
            writer.write_event(Event::End(BytesEnd::new("nameIdentifier")))?;
        }
        for affiliation in &creator.affiliations {
            write_text_element(&mut writer, "affiliation", affiliation)?;
        }
        writer.write_event(Event::End(BytesEnd::new("creator")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("creators")))?;

    writer.write_event(Event::Start(BytesStart::new("titles")))?;
    write_text_element(&mut writer, "title", &pkg.title)?;
    writer.write_event(Event::End(BytesEnd::new("titles")))?;

    write_text_element(&mut writer, "publisher", &pkg.created_by)?;
    write_text_element(
        &mut writer,
        "publicationYear",
        &pkg.created.year().to_string(),
    )?;

    if !pkg.tags.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("subjects")))?;
        for tag in &pkg.tags {
            write_text_element(&mut writer, "subject", &tag.value)?;
        }
        writer.write_event(Event::End(BytesEnd::new("subjects")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("dates")))?;
    write_date(&mut writer, "Created", &pkg.created.to_rfc3339())?;
    write_date(&mut writer, "Updated", &pkg.modified.to_rfc3339())?;
    writer.write_event(Event::End(BytesEnd::new("dates")))?;

    writer.write_event(Event::Start(BytesStart::new("rightsList")))?;
    write_text_element(&mut writer, "rights", pkg.license.as_str())?;
    writer.write_event(Event::End(BytesEnd::new("rightsList")))?;

    writer.write_event(Event::Start(BytesStart::new("descriptions")))?;
    let mut description = BytesStart::new("description");
    description.push_attribute(("descriptionType", "Abstract"));
    writer.write_event(Event::Start(description))?;
    writer.write_event(Event::Text(BytesText::new(&pkg.description)))?;
    writer.write_event(Event::End(BytesEnd::new("description")))?;
    writer.write_event(Event::End(BytesEnd::new("descriptions")))?;

    let alternates: Vec<_> = pkg.alternative_identifiers().collect();
    if !alternates.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("alternateIdentifiers")))?;
        for identifier in alternates {
            let mut element = BytesStart::new("alternateIdentifier");
            element.push_attribute((
                "alternateIdentifierType",
                identifier.identifier_type.as_str(),
            ));
            writer.write_event(Event::Start(element))?;
            writer.write_event(Event::Text(BytesText::new(&identifier.identifier)))?;
            writer.write_event(Event::End(BytesEnd::new("alternateIdentifier")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("alternateIdentifiers")))?;
    }

    let related: Vec<_> = pkg
        .related_identifiers
        .iter()
        .filter(|id| id.relation_type != RelationType::IsAlternativeOf)
        .collect();
    if !related.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("relatedIdentifiers")))?;
        for identifier in related {
            let mut element = BytesStart::new("relatedIdentifier");
            element.push_attribute((
                "relatedIdentifierType",
                identifier.identifier_type.as_str(),
            ));
            element.push_attribute(("relationType", identifier.relation_type.metadata_name()));
            writer.write_event(Event::Start(element))?;
            writer.write_event(Event::Text(BytesText::new(&identifier.identifier)))?;
            writer.write_event(Event::End(BytesEnd::new("relatedIdentifier")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("relatedIdentifiers")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("resource")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| SeedbankError::Fatal(format!("rendered metadata is not UTF-8: {}", e)))
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_date(writer: &mut Writer<Vec<u8>>, date_type: &str, value: &str) -> Result<()> {
    let mut element = BytesStart::new("date");
    element.push_attribute(("dateType", date_type));
    writer.write_event(Event::Start(element))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new("date")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Creator, DataPackageFile, Doi, IdentifierScheme, IdentifierType, License,
        RelatedIdentifier, Tag,
    };
    use chrono::Utc;

    fn sample_package() -> DataPackage {
        let now = Utc::now();
        DataPackage {
            key: "pkg1".to_string(),
            doi: Some(Doi::parse("10.5072/abc123").unwrap()),
            title: "Moth observations".to_string(),
            description: "Nightly moth trap records & counts".to_string(),
            license: License::CcBy4_0,
            created_by: "alice".to_string(),
            created: now,
            modified: now,
            deleted: None,
            size: 6,
            checksum: "aa".to_string(),
            citation: None,
            files: vec![DataPackageFile {
                file_name: "occurrences.csv".to_string(),
                checksum: "aa".to_string(),
                size: 6,
            }],
            creators: vec![Creator {
                name: "Alice".to_string(),
                affiliations: vec!["Natural History Unit".to_string()],
                identifier: Some("https://orcid.org/0000-0001-5473-3208".to_string()),
                identifier_scheme: Some(IdentifierScheme::Orcid),
                scheme_uri: Some("https://orcid.org/".to_string()),
            }],
            tags: vec![Tag {
                value: "lepidoptera".to_string(),
            }],
            related_identifiers: vec![
                RelatedIdentifier {
                    identifier: "urn:lsid:example.org:col:1".to_string(),
                    identifier_type: IdentifierType::Lsid,
                    relation_type: RelationType::IsAlternativeOf,
                },
                RelatedIdentifier {
                    identifier: "https://example.org/paper".to_string(),
                    identifier_type: IdentifierType::Url,
                    relation_type: RelationType::References,
                },
            ],
        }
    }

    #[test]
    fn test_render_contains_core_sections() {
        let xml = render_metadata(&sample_package()).unwrap();

        assert!(xml.contains(r#"<identifier identifierType="DOI">10.5072/abc123</identifier>"#));
        assert!(xml.contains("<creatorName>Alice</creatorName>"));
        assert!(xml.contains(r#"nameIdentifierScheme="ORCID""#));
        assert!(xml.contains(r#"schemeURI="https://orcid.org/""#));
        assert!(xml.contains("<title>Moth observations</title>"));
        assert!(xml.contains("<subject>lepidoptera</subject>"));
        assert!(xml.contains(r#"alternateIdentifierType="LSID""#));
        assert!(xml.contains(r#"relationType="References""#));
    }

    #[test]
    fn test_render_escapes_text() {
        let xml = render_metadata(&sample_package()).unwrap();
        assert!(xml.contains("Nightly moth trap records &amp; counts"));
    }

    #[test]
    fn test_render_without_doi_leaves_identifier_empty() {
        let mut pkg = sample_package();
        pkg.doi = None;
        let xml = render_metadata(&pkg).unwrap();
        assert!(xml.contains(r#"<identifier identifierType="DOI">"#));
        assert!(!xml.contains("10.5072"));
    }
}
