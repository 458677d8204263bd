//! Archive entry naming

use std::collections::HashMap;

/// Extension given to every archive entry
pub const ENTRY_EXTENSION: &str = "mp3";

/// Build the archive entry name for a track: `"{artist} - {title}.mp3"`.
///
/// Artist and title are trimmed of surrounding whitespace. Path separators
/// are replaced with `_` so a name never introduces directories inside the
/// container.
///
/// # Examples
///
/// ```
/// use album_zip::utils::entry_name;
///
/// assert_eq!(entry_name("  A ", " T1\n"), "A - T1.mp3");
/// assert_eq!(entry_name("AC/DC", "T.N.T."), "AC_DC - T.N.T..mp3");
/// ```
#[must_use]
pub fn entry_name(artist: &str, title: &str) -> String {
    format!(
        "{} - {}.{}",
        strip_separators(artist.trim()),
        strip_separators(title.trim()),
        ENTRY_EXTENSION
    )
}

fn strip_separators(part: &str) -> String {
    part.replace(['/', '\\'], "_")
}

/// Assign collision-free names to a sequence of base names, in order.
///
/// The first occurrence keeps its name; later ones get ` (1)`, ` (2)`, ...
/// inserted before the extension. Because this runs over descriptor order
/// rather than completion order, the same album always maps to the same
/// set of names.
///
/// # Examples
///
/// ```
/// use album_zip::utils::disambiguate;
///
/// let names = disambiguate(vec![
///     "A - T.mp3".to_string(),
///     "B - U.mp3".to_string(),
///     "A - T.mp3".to_string(),
/// ]);
/// assert_eq!(names, ["A - T.mp3", "B - U.mp3", "A - T (1).mp3"]);
/// ```
#[must_use]
pub fn disambiguate(names: Vec<String>) -> Vec<String> {
    let mut taken: HashMap<String, usize> = HashMap::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        if !taken.contains_key(&name) {
            taken.insert(name.clone(), 0);
            out.push(name);
            continue;
        }

        let (stem, extension) = split_extension(&name);
        let mut counter = taken.get(&name).copied().unwrap_or(0);
        let candidate = loop {
            counter += 1;
            let candidate = match extension {
                Some(ext) => format!("{} ({}).{}", stem, counter, ext),
                None => format!("{} ({})", stem, counter),
            };
            if !taken.contains_key(&candidate) {
                break candidate;
            }
        };
        taken.insert(name, counter);
        taken.insert(candidate.clone(), 0);
        out.push(candidate);
    }

    out
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
