//! Plain-text citation string for a package, persisted on the package row
//! at create/update time.

use crate::model::DataPackage;
use chrono::Datelike;

/// `Creator1, Creator2 (year). Title. https://doi.org/prefix/suffix` with
/// the creator list falling back to the creating user and the DOI part
/// omitted when none is assigned.
pub fn render_citation(pkg: &DataPackage) -> String {
    let names: Vec<&str> = pkg.creators.iter().map(|c| c.name.as_str()).collect();
    let authors = if names.is_empty() {
        pkg.created_by.clone()
    } else {
        names.join(", ")
    };

    let mut citation = format!(
        "{} ({}). {}.",
        authors,
        pkg.created.year(),
        pkg.title.trim_end_matches('.')
    );

    if let Some(doi) = &pkg.doi {
        citation.push(' ');
        citation.push_str(&doi.url());
    }

    citation
}
