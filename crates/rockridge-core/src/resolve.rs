//! Path resolution: splits a path into components and walks the directory
//! tree to the matching record, preferring the Rock Ridge alternate name
//! over the raw ISO-9660 filename at every step.

use crate::security::{MAX_COMPONENT_LEN, MAX_PATH_COMPONENTS};
use crate::susp::{read_attributes, RockRidgeAttributes};
use crate::volume::{DirectoryRecord, Image};
use crate::walk::children;
use crate::Error;

/// A path split into its non-empty components, with the limits from the
/// host callback surface already enforced, plus whether the original path
/// ended in `/` — a final component resolving to a plain file is only an
/// error when this bit is set.
#[derive(Debug, Clone)]
pub struct PathComponents {
    parts: Vec<String>,
    trailing_slash: bool,
}

impl PathComponents {
    pub fn parse(path: &str) -> Result<Self, Error> {
        let parts: Vec<String> = path
            .split('/')
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect();
        let trailing_slash = !parts.is_empty() && path.ends_with('/');

        if parts.len() > MAX_PATH_COMPONENTS {
            return Err(Error::name_too_long(format!(
                "path has {} components, limit is {MAX_PATH_COMPONENTS}",
                parts.len()
            )));
        }
        for part in &parts {
            if part.len() > MAX_COMPONENT_LEN {
                return Err(Error::name_too_long(format!(
                    "component {part:?} exceeds {MAX_COMPONENT_LEN} bytes"
                )));
            }
        }
        Ok(Self { parts, trailing_slash })
    }

    pub fn as_slice(&self) -> &[String] {
        &self.parts
    }

    pub fn trailing_slash(&self) -> bool {
        self.trailing_slash
    }
}

/// Effective display/match name for a directory record: the Rock Ridge
/// alternate name if present, otherwise the raw ISO-9660 name with the
/// `;version` suffix and a bare trailing dot stripped.
pub fn effective_name(record: &DirectoryRecord<'_>, rr: &RockRidgeAttributes) -> Vec<u8> {
    if let Some(name) = &rr.name {
        return name.clone();
    }
    if record.filename == [0u8] {
        return b".".to_vec();
    }
    if record.filename == [1u8] {
        return b"..".to_vec();
    }

    let mut name = record.filename.to_vec();
    if let Some(pos) = name.iter().position(|&b| b == b';') {
        name.truncate(pos);
    }
    if name.last() == Some(&b'.') {
        name.pop();
    }
    name
}

/// The outcome of resolving a path: the matched record and Rock Ridge
/// attributes, plus the chain of ancestor directories (root first) each
/// paired with its own attributes, needed to evaluate the execute-bit on
/// every traversed ancestor.
pub struct ResolvedRecord<'a> {
    pub record: DirectoryRecord<'a>,
    pub rock_ridge: RockRidgeAttributes,
    pub ancestors: Vec<(DirectoryRecord<'a>, RockRidgeAttributes)>,
}

/// Load a non-root record's Rock Ridge attributes, applying the image's
/// `len_skp` (see [`Image::system_use_skip`]). SUSP parsing never fails: a
/// malformed system-use area just yields fewer attributes.
fn load_attrs<'a>(image: &Image<'a>, record: &DirectoryRecord<'a>) -> RockRidgeAttributes {
    read_attributes(image.data(), record.system_use, image.block_size(), image.system_use_skip())
}

/// Resolve `path` (absolute, `/`-rooted) against `image`. The root path `/`
/// is a fast path that never walks the directory tree.
pub fn resolve<'a>(image: &Image<'a>, path: &str) -> Result<ResolvedRecord<'a>, Error> {
    let root = image.root();
    // The root record's own system-use area is where an `SP` field (if any)
    // establishes `len_skp`, so it is read unskipped.
    let root_attrs = read_attributes(image.data(), root.system_use, image.block_size(), 0);

    let components = PathComponents::parse(path)?;
    if components.as_slice().is_empty() {
        return Ok(ResolvedRecord {
            record: root,
            rock_ridge: root_attrs,
            ancestors: Vec::new(),
        });
    }

    let mut current = root;
    let mut current_attrs = root_attrs;
    let mut ancestors = Vec::new();
    let last_index = components.as_slice().len() - 1;

    for (i, component) in components.as_slice().iter().enumerate() {
        if !current.is_directory() {
            return Err(Error::not_a_directory(format!(
                "{:?} is not a directory",
                String::from_utf8_lossy(&effective_name(&current, &current_attrs))
            )));
        }

        let mut matched = None;
        for entry in children(image.data(), &current, image.block_size())? {
            let entry = entry?;
            if entry.filename == [0u8] || entry.filename == [1u8] {
                continue;
            }
            let entry_attrs = load_attrs(image, &entry);
            if effective_name(&entry, &entry_attrs) == component.as_bytes() {
                matched = Some((entry, entry_attrs));
                break;
            }
        }

        let (next_record, next_attrs) = matched.ok_or_else(|| {
            Error::not_found(format!(
                "{} (component {} of {})",
                component,
                i + 1,
                components.as_slice().len()
            ))
        })?;

        if i == last_index && components.trailing_slash() && !next_record.is_directory() {
            return Err(Error::not_a_directory(format!(
                "{:?} is not a directory",
                String::from_utf8_lossy(&effective_name(&next_record, &next_attrs))
            )));
        }

        ancestors.push((current, current_attrs));
        current = next_record;
        current_attrs = next_attrs;
    }

    Ok(ResolvedRecord {
        record: current,
        rock_ridge: current_attrs,
        ancestors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::test_fixture::minimal_image;

    fn record(name: &str, flags: u8, extent: u32, data: &mut Vec<u8>, offset: usize) -> usize {
        let name_bytes = name.as_bytes();
        let mut length = 33 + name_bytes.len();
        length += 1 - (name_bytes.len() & 1);
        data[offset] = length as u8;
        data[offset + 2..offset + 6].copy_from_slice(&extent.to_le_bytes());
        data[offset + 6..offset + 10].copy_from_slice(&extent.to_be_bytes());
        data[offset + 10..offset + 14].copy_from_slice(&2048u32.to_le_bytes());
        data[offset + 14..offset + 18].copy_from_slice(&2048u32.to_be_bytes());
        data[offset + 25] = flags;
        data[offset + 32] = name_bytes.len() as u8;
        data[offset + 33..offset + 33 + name_bytes.len()].copy_from_slice(name_bytes);
        offset + length
    }

    fn image_with_root_listing() -> Vec<u8> {
        let mut image = minimal_image();
        let root_extent_offset = 20 * 2048;
        image.resize(root_extent_offset + 4096, 0);
        let mut offset = root_extent_offset;
        offset = record("\u{0}", DirectoryRecord::FLAG_DIRECTORY, 20, &mut image, offset);
        offset = record("\u{1}", DirectoryRecord::FLAG_DIRECTORY, 1, &mut image, offset);
        offset = record("SUBDIR", DirectoryRecord::FLAG_DIRECTORY, 21, &mut image, offset);
        let _ = record("README.TXT;1", 0, 22, &mut image, offset);

        let subdir_offset = 21 * 2048;
        image.resize(subdir_offset + 2048, 0);
        let mut sub_offset = subdir_offset;
        sub_offset = record("\u{0}", DirectoryRecord::FLAG_DIRECTORY, 21, &mut image, sub_offset);
        let _ = record("\u{1}", DirectoryRecord::FLAG_DIRECTORY, 20, &mut image, sub_offset);
        image
    }

    #[test]
    fn resolves_root() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        let resolved = resolve(&loaded, "/").unwrap();
        assert!(resolved.record.is_directory());
        assert!(resolved.ancestors.is_empty());
    }

    #[test]
    fn resolves_nested_file_and_strips_version() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        let resolved = resolve(&loaded, "/README.TXT").unwrap();
        assert!(!resolved.record.is_directory());
    }

    #[test]
    fn resolves_subdirectory() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        let resolved = resolve(&loaded, "/SUBDIR").unwrap();
        assert!(resolved.record.is_directory());
        assert_eq!(resolved.ancestors.len(), 1);
    }

    #[test]
    fn missing_component_is_not_found() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        assert!(matches!(resolve(&loaded, "/NOPE").unwrap_err(), Error::NotFound(_)));
    }

    #[test]
    fn file_in_path_position_is_not_a_directory() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        let err = resolve(&loaded, "/README.TXT/EXTRA").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)) || matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn trailing_slash_onto_file_is_not_a_directory() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        assert!(matches!(
            resolve(&loaded, "/README.TXT/").unwrap_err(),
            Error::NotADirectory(_)
        ));
    }

    #[test]
    fn trailing_slash_onto_directory_still_resolves() {
        let image = image_with_root_listing();
        let loaded = Image::load(&image).unwrap();
        let resolved = resolve(&loaded, "/SUBDIR/").unwrap();
        assert!(resolved.record.is_directory());
    }

    #[test]
    fn rejects_too_many_components() {
        let path = "/".to_string() + &"a/".repeat(40);
        assert!(matches!(PathComponents::parse(&path), Err(Error::NameTooLong(_))));
    }

    #[test]
    fn rejects_overlong_component() {
        let path = format!("/{}", "a".repeat(300));
        assert!(matches!(PathComponents::parse(&path), Err(Error::NameTooLong(_))));
    }
}
