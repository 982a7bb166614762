//! Subject discovery from glob patterns or from text-file lists.
//!
//! Lithium images carry the subject id as the basename prefix before the
//! first `_` (`sub-01_ses-1_acq-trufi_limri.nii`). Anatomical images are
//! found through the BIDS layout `sub-*/ses-*/anat/<file>`, i.e. the fourth
//! path component from the end.

use crate::domain::errors::LimriError;
use crate::domain::models::Subject;
use glob::glob;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

pub fn li_subject_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
        .split('_')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn bids_subject_id(path: &Path) -> Option<String> {
    match path.components().rev().nth(3)? {
        Component::Normal(part) => Some(part.to_string_lossy().to_string()),
        _ => None,
    }
}

/// Files matching `pattern`, sorted. A pattern without wildcards matches
/// the file itself when it exists.
pub fn expand_pattern(pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = glob(pattern)
        .map_err(|e| anyhow::anyhow!("invalid pattern {}: {}", pattern, e))?
        .filter_map(Result::ok)
        .collect();
    if paths.is_empty() {
        return Err(LimriError::NoMatch(pattern.to_string()).into());
    }
    paths.sort();
    Ok(paths)
}

/// Joins the three file sets on subject id. Subjects missing any image
/// are dropped; for duplicate ids the first file wins.
pub fn group_subjects(li: &[PathBuf], lianat: &[PathBuf], anat: &[PathBuf]) -> Vec<Subject> {
    let mut li_by_id: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in li {
        let id = li_subject_id(path);
        if li_by_id.contains_key(&id) {
            tracing::warn!(subject = %id, file = %path.display(), "duplicate Li image ignored");
            continue;
        }
        li_by_id.insert(id, path.clone());
    }
    let by_bids_id = |files: &[PathBuf], kind: &str| {
        let mut out: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in files {
            let Some(id) = bids_subject_id(path) else {
                tracing::warn!(file = %path.display(), "{} image outside a BIDS layout ignored", kind);
                continue;
            };
            if out.contains_key(&id) {
                tracing::warn!(subject = %id, file = %path.display(), "duplicate {} image ignored", kind);
                continue;
            }
            out.insert(id, path.clone());
        }
        out
    };
    let lianat_by_id = by_bids_id(lianat, "Lianat");
    let anat_by_id = by_bids_id(anat, "anat");

    let mut subjects = Vec::new();
    for (id, li_path) in li_by_id {
        match (lianat_by_id.get(&id), anat_by_id.get(&id)) {
            (Some(lianat_path), Some(anat_path)) => subjects.push(Subject {
                id,
                li: li_path,
                lianat: lianat_path.clone(),
                anat: anat_path.clone(),
            }),
            _ => tracing::warn!(subject = %id, "incomplete subject dropped"),
        }
    }
    tracing::info!(count = subjects.len(), "subjects to preprocess");
    subjects
}

pub fn discover_from_globs(li: &str, lianat: &str, anat: &str) -> anyhow::Result<Vec<Subject>> {
    let li_files = expand_pattern(li)?;
    let lianat_files = expand_pattern(lianat)?;
    let anat_files = expand_pattern(anat)?;
    Ok(group_subjects(&li_files, &lianat_files, &anat_files))
}

/// One path per line; surrounding whitespace and blank lines are ignored.
pub fn read_list(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read list {}: {}", path.display(), e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Picks the three list files for `file_txt` mode. The `*_file_txt` flags
/// go together; without them the positional inputs are the lists.
pub fn select_list_files<'a>(
    li_txt: Option<&'a Path>,
    lianat_txt: Option<&'a Path>,
    anat_txt: Option<&'a Path>,
    fallback: [&'a Path; 3],
) -> Result<[&'a Path; 3], LimriError> {
    match (li_txt, lianat_txt, anat_txt) {
        (Some(li), Some(lianat), Some(anat)) => Ok([li, lianat, anat]),
        (None, None, None) => Ok(fallback),
        (li, lianat, _) => {
            let given = if li.is_some() {
                "Li_file_txt"
            } else if lianat.is_some() {
                "Lianat_file_txt"
            } else {
                "anat_file_txt"
            };
            Err(LimriError::IncompleteFileLists {
                given: given.to_string(),
            })
        }
    }
}

/// Subjects from three parallel lists, kept in file order. The lists must
/// have the same length and the same basename-prefix order.
pub fn discover_from_lists(
    li_txt: &Path,
    lianat_txt: &Path,
    anat_txt: &Path,
) -> anyhow::Result<Vec<Subject>> {
    let li = read_list(li_txt)?;
    let lianat = read_list(lianat_txt)?;
    let anat = read_list(anat_txt)?;
    if li.len() != lianat.len() || li.len() != anat.len() {
        return Err(LimriError::ListLengthMismatch {
            li: li.len(),
            lianat: lianat.len(),
            anat: anat.len(),
        }
        .into());
    }
    let mut subjects = Vec::with_capacity(li.len());
    for (line, ((li_path, lianat_path), anat_path)) in
        li.into_iter().zip(lianat).zip(anat).enumerate()
    {
        let ids = [
            li_subject_id(&li_path),
            li_subject_id(&lianat_path),
            li_subject_id(&anat_path),
        ];
        if ids[0] != ids[1] || ids[0] != ids[2] {
            let [li, lianat, anat] = ids;
            return Err(LimriError::ListOrderMismatch {
                line: line + 1,
                li,
                lianat,
                anat,
            }
            .into());
        }
        let [id, _, _] = ids;
        subjects.push(Subject {
            id,
            li: li_path,
            lianat: lianat_path,
            anat: anat_path,
        });
    }
    Ok(subjects)
}
