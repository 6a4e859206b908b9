use sha2::{Digest, Sha256};

use crate::model::{BenchmarkTemplate, TemplateParameter};

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hex: String,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Identifies the configuration a benchmark run executed with, so two runs can
/// be compared only when they measured the same thing.
///
/// Parameters are sorted by name before hashing.
pub fn compute(template: &BenchmarkTemplate, params: &[TemplateParameter]) -> Fingerprint {
    let mut parts = Vec::new();

    parts.push(format!("template={}", template.name));
    parts.push(format!("template_version={}", template.version));

    let mut sorted: Vec<&TemplateParameter> = params.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for p in sorted {
        parts.push(format!("param:{}:{}={}", p.name, p.param_type, p.value));
    }

    parts.push(format!("lorelai_version={}", env!("CARGO_PKG_VERSION")));

    Fingerprint {
        hex: sha256_hex(&parts.join("\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterType;

    fn template() -> BenchmarkTemplate {
        BenchmarkTemplate {
            id: 1,
            name: "T1".into(),
            description: String::new(),
            version: 3,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn param(name: &str, value: &str) -> TemplateParameter {
        TemplateParameter {
            template_id: 1,
            name: name.into(),
            param_type: ParameterType::String,
            value: value.into(),
        }
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a = compute(&template(), &[param("a", "1"), param("b", "2")]);
        let b = compute(&template(), &[param("b", "2"), param("a", "1")]);
        assert_eq!(a.hex, b.hex);
    }

    #[test]
    fn value_change_changes_fingerprint() {
        let a = compute(&template(), &[param("code_version", "1.0")]);
        let b = compute(&template(), &[param("code_version", "1.1")]);
        assert_ne!(a.hex, b.hex);
    }
}
