//! Placeholder substitution for encode settings.
//!
//! Placeholders are `${NAME}`. The built-in names are `INPUT`, `OUTPUT`,
//! `WIDTH`, `HEIGHT`, `BITRATE` and `HRDBUFFER` (twice the bitrate); every
//! pipeline variable is available under its own name. In JSON templates a
//! numeric placeholder written as a whole string (`"${WIDTH}"`) becomes a bare
//! number, so service schemas that expect integers accept the rendered job.

use autoabr_core::{Resolution, Variables};
use serde_json::Value;

use crate::error::{ExecError, Result};

/// Per-pair values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateParams<'a> {
    pub input: &'a str,
    /// Output location without its media extension.
    pub output: &'a str,
    pub resolution: Resolution,
    pub bitrate: u64,
    pub variables: &'a Variables,
}

impl TemplateParams<'_> {
    fn numeric(&self) -> [(&'static str, u64); 4] {
        [
            ("WIDTH", u64::from(self.resolution.width)),
            ("HEIGHT", u64::from(self.resolution.height)),
            ("BITRATE", self.bitrate),
            ("HRDBUFFER", self.bitrate * 2),
        ]
    }
}

fn placeholder(name: &str) -> String {
    format!("${{{name}}}")
}

/// Plain textual substitution, used for encoder command-line options.
pub fn substitute(text: &str, params: &TemplateParams<'_>) -> String {
    let mut out = text
        .replace(&placeholder("INPUT"), params.input)
        .replace(&placeholder("OUTPUT"), params.output);
    for (name, value) in params.numeric() {
        out = out.replace(&placeholder(name), &value.to_string());
    }
    for (name, value) in params.variables {
        out = out.replace(&placeholder(name), value);
    }
    out
}

/// String contents escaped for insertion between JSON quotes.
fn json_escaped(value: &str) -> Result<String> {
    let quoted = serde_json::to_string(value).map_err(|e| ExecError::Template(e.to_string()))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// A JSON job-settings document with `${...}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTemplate {
    raw: String,
}

impl EncodeTemplate {
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ExecError::Config("encoding profile must be a JSON object".into()));
        }
        let raw = serde_json::to_string(value).map_err(|e| ExecError::Template(e.to_string()))?;
        Ok(Self { raw })
    }

    pub fn render(&self, params: &TemplateParams<'_>) -> Result<Value> {
        let mut text = self.raw.clone();
        for (name, value) in params.numeric() {
            let quoted = format!("\"{}\"", placeholder(name));
            text = text.replace(&quoted, &value.to_string());
            text = text.replace(&placeholder(name), &value.to_string());
        }
        text = text
            .replace(&placeholder("INPUT"), &json_escaped(params.input)?)
            .replace(&placeholder("OUTPUT"), &json_escaped(params.output)?);
        for (name, value) in params.variables {
            text = text.replace(&placeholder(name), &json_escaped(value)?);
        }
        serde_json::from_str(&text).map_err(|e| ExecError::Template(format!("rendered settings are not valid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(vars: &Variables) -> TemplateParams<'_> {
        TemplateParams {
            input: "s3://in/job/reference.mp4",
            output: "s3://out/encoded-files/job/1280x720_500000",
            resolution: Resolution::new(1280, 720),
            bitrate: 500_000,
            variables: vars,
        }
    }

    #[test]
    fn numeric_placeholders_become_numbers() {
        let mut vars = Variables::new();
        vars.insert("PRESET".into(), "SLOW".into());
        let template = EncodeTemplate::from_value(&json!({
            "Inputs": [{"FileInput": "${INPUT}"}],
            "OutputGroups": [{
                "Destination": "${OUTPUT}",
                "Width": "${WIDTH}",
                "Height": "${HEIGHT}",
                "Bitrate": "${BITRATE}",
                "HrdBufferSize": "${HRDBUFFER}",
                "Preset": "${PRESET}",
                "Label": "w${WIDTH}"
            }]
        }))
        .unwrap();

        let rendered = template.render(&params(&vars)).unwrap();
        let group = &rendered["OutputGroups"][0];
        assert_eq!(rendered["Inputs"][0]["FileInput"], "s3://in/job/reference.mp4");
        assert_eq!(group["Destination"], "s3://out/encoded-files/job/1280x720_500000");
        assert_eq!(group["Width"], 1280);
        assert_eq!(group["Height"], 720);
        assert_eq!(group["Bitrate"], 500_000);
        assert_eq!(group["HrdBufferSize"], 1_000_000);
        assert_eq!(group["Preset"], "SLOW");
        assert_eq!(group["Label"], "w1280");
    }

    #[test]
    fn variable_values_are_escaped() {
        let mut vars = Variables::new();
        vars.insert("NOTE".into(), "say \"hi\"".into());
        let template = EncodeTemplate::from_value(&json!({"Note": "${NOTE}"})).unwrap();
        let rendered = template.render(&params(&vars)).unwrap();
        assert_eq!(rendered["Note"], "say \"hi\"");
    }

    #[test]
    fn plain_substitution_for_options() {
        let vars = Variables::new();
        assert_eq!(substitute("scale=${WIDTH}:${HEIGHT}", &params(&vars)), "scale=1280:720");
        assert_eq!(substitute("${HRDBUFFER}", &params(&vars)), "1000000");
    }

    #[test]
    fn non_object_profile_is_rejected() {
        assert!(matches!(EncodeTemplate::from_value(&json!([1, 2])), Err(ExecError::Config(_))));
    }
}
