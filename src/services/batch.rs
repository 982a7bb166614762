//! MATLAB batch templating.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` stand for literal
//! braces so MATLAB cell syntax survives rendering.

use crate::domain::constants::CAT12_VBM_TEMPLATE;
use crate::domain::errors::LimriError;
use std::collections::BTreeMap;
use std::path::Path;

/// Single-quoted MATLAB string literal.
pub fn matlab_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn render_template(
    template: &str,
    values: &BTreeMap<&str, String>,
) -> Result<String, LimriError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    if n == '{' {
                        return Err(LimriError::UnbalancedBrace(pos));
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(LimriError::UnbalancedBrace(pos));
                }
                let value = values
                    .get(name.as_str())
                    .ok_or_else(|| LimriError::UnknownPlaceholder(name.clone()))?;
                out.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(LimriError::UnbalancedBrace(pos));
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Renders the CAT12 VBM batch for `anat_files` into `out`. The built-in
/// template is used when `template` is `None`.
pub fn write_matlabbatch(
    template: Option<&Path>,
    anat_files: &[&Path],
    tpm_file: &Path,
    darteltpm_file: &Path,
    out: &Path,
) -> anyhow::Result<()> {
    let text = match template {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read template {}: {}", path.display(), e))?,
        None => CAT12_VBM_TEMPLATE.to_string(),
    };
    let anat_list: String = anat_files
        .iter()
        .map(|p| format!("{} \n", matlab_quote(&p.display().to_string())))
        .collect();
    let mut values = BTreeMap::new();
    values.insert("anat_file", anat_list);
    values.insert("tpm_file", tpm_file.display().to_string());
    values.insert("darteltpm_file", darteltpm_file.display().to_string());
    let rendered = render_template(&text, &values)?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out, rendered)?;
    tracing::debug!(batch = %out.display(), "wrote CAT12 batch");
    Ok(())
}
