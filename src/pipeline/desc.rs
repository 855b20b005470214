//! Pipeline description parsing (§4.5, §6): a declarative JSON document
//! mapping pipeline name → human-readable metadata + an ordered `work`
//! section of `level_name -> { module_name -> module_parameters }`.
//!
//! Grounded in `original_source/src-core/core/pipeline.cpp`'s
//! `loadPipeline`/`loadPipelines`, which parses with `nlohmann::ordered_json`
//! specifically to preserve step order; this module relies on
//! `serde_json`'s `preserve_order` feature for the same reason, since step
//! order is load-bearing (step 0 is the input level, steps 1/2 are the
//! fusion candidates).
use std::path::Path;

use crate::error::{Error, Result};
use crate::pipeline::registry::Registry;

/// One module entry within a [`PipelineStep`]: its registry id, its raw
/// parameter map, and an optional `input_override` path (relative to the
/// output directory) pulled out of that map.
#[derive(Debug, Clone)]
pub struct PipelineModule {
    pub module_name: String,
    pub parameters: serde_json::Value,
    pub input_override: Option<String>,
}

/// One level of a pipeline's `work` section: a name and the (ordered) set
/// of modules that produce it.
#[derive(Debug, Clone)]
pub struct PipelineStep {
    pub level_name: String,
    pub modules: Vec<PipelineModule>,
}

/// A fully parsed pipeline, ready to [`crate::pipeline::orchestrator::run`].
#[derive(Debug, Clone, Default)]
pub struct PipelineDesc {
    pub name: String,
    pub readable_name: String,
    /// The pipeline's own editable-parameter schema/defaults (§6).
    pub parameters: serde_json::Value,
    /// Whether this pipeline accepts a live (SDR/network) source. Inert
    /// metadata for this core (§4.5): carried through for a GUI/SDR layer
    /// downstream, never consulted by the orchestrator itself.
    pub live: bool,
    pub live_cfg: serde_json::Value,
    /// Labelled frequencies (Hz), inert metadata same as `live_cfg`.
    pub frequencies: Vec<(String, u64)>,
    pub steps: Vec<PipelineStep>,
}

/// Load and parse every pipeline described in the document at `path`,
/// resolving `.json.inc` includes first. Pipelines that reference a
/// module absent from `registry` are silently skipped, matching
/// `loadPipeline`'s `hasAllModules` behavior.
pub fn load_pipelines(path: &Path, registry: &Registry) -> Result<Vec<PipelineDesc>> {
    let text = resolve_includes(path)?;
    parse_pipelines(&text, registry)
}

/// Textually splice in any `"<relative-path>.json.inc"` references found
/// in the document at `path`, relative to its parent directory. Bounded to
/// a handful of passes so a cyclic or very deep include chain fails
/// instead of looping forever.
pub fn resolve_includes(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    resolve_includes_str(raw, &base_dir)
}

const MAX_INCLUDE_PASSES: usize = 8;

fn resolve_includes_str(mut text: String, base_dir: &Path) -> Result<String> {
    for _ in 0..MAX_INCLUDE_PASSES {
        let Some(include_name) = find_next_include(&text) else {
            return Ok(text);
        };
        let include_path = base_dir.join(&include_name);
        if !include_path.exists() {
            return Err(Error::config(format!(
                "could not include {}",
                include_path.display()
            )));
        }
        let replacement = std::fs::read_to_string(&include_path)?;
        let needle = format!("\"{include_name}\"");
        text = text.replace(&needle, &replacement);
    }
    Err(Error::config(format!(
        "include chain in {} exceeded {MAX_INCLUDE_PASSES} passes",
        base_dir.display()
    )))
}

/// Find the first `"<...>.json.inc"` quoted string literal in `text`.
fn find_next_include(text: &str) -> Option<String> {
    let marker = text.find(".json.inc")?;
    let end = marker + ".json.inc".len();
    let start = text[..marker].rfind('"')? + 1;
    Some(text[start..end].to_string())
}

/// Parse a pipeline document's text (after include resolution) into its
/// constituent [`PipelineDesc`]s.
pub fn parse_pipelines(json_text: &str, registry: &Registry) -> Result<Vec<PipelineDesc>> {
    let root: serde_json::Value = serde_json::from_str(json_text)?;
    let obj = root
        .as_object()
        .ok_or_else(|| Error::config("pipeline document must be a JSON object"))?;

    let mut pipelines = Vec::new();
    for (name, val) in obj {
        let readable_name = val
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(name)
            .to_string();
        let parameters = val.get("parameters").cloned().unwrap_or(serde_json::Value::Null);
        let live = val.get("live").and_then(|v| v.as_bool()).unwrap_or(false);
        let live_cfg = val.get("live_cfg").cloned().unwrap_or(serde_json::Value::Null);
        let frequencies = val
            .get("frequencies")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|pair| {
                        let pair = pair.as_array()?;
                        let label = pair.first()?.as_str()?.to_string();
                        let hz = pair.get(1)?.as_u64()?;
                        Some((label, hz))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let Some(work) = val.get("work").and_then(|v| v.as_object()) else {
            return Err(Error::config(format!("pipeline '{name}' has no 'work' section")));
        };

        let mut steps = Vec::with_capacity(work.len());
        let mut has_all_modules = true;
        for (level_name, modules_val) in work {
            let Some(modules_obj) = modules_val.as_object() else {
                return Err(Error::config(format!(
                    "level '{level_name}' in pipeline '{name}' must map module name to parameters"
                )));
            };
            let mut modules = Vec::with_capacity(modules_obj.len());
            for (module_name, params) in modules_obj {
                if !registry.contains(module_name) {
                    has_all_modules = false;
                }
                let input_override = params
                    .get("input_override")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                modules.push(PipelineModule {
                    module_name: module_name.clone(),
                    parameters: params.clone(),
                    input_override,
                });
            }
            steps.push(PipelineStep {
                level_name: level_name.clone(),
                modules,
            });
        }

        if !has_all_modules {
            log::warn!("pipeline '{name}' references an unregistered module, skipping");
            continue;
        }

        pipelines.push(PipelineDesc {
            name: name.clone(),
            readable_name,
            parameters,
            live,
            live_cfg,
            frequencies,
            steps,
        });
    }
    Ok(pipelines)
}

/// Overlay `pipeline_params` onto `module_params`: runtime/pipeline-level
/// parameters win on key conflicts, and keys the module didn't declare are
/// still added (§8 "Parameter override"). Grounded in
/// `Pipeline::prepareParameters`.
pub fn prepare_parameters(
    module_params: &serde_json::Value,
    pipeline_params: &serde_json::Value,
) -> serde_json::Value {
    let mut out = if module_params.is_object() {
        module_params.clone()
    } else {
        serde_json::Value::Object(serde_json::Map::new())
    };
    if let Some(overrides) = pipeline_params.as_object() {
        let out_obj = out.as_object_mut().expect("constructed as an object above");
        for (key, value) in overrides {
            out_obj.insert(key.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_work_section_and_preserves_step_order() {
        let json = r#"{
            "lrpt": {
                "name": "LRPT",
                "parameters": {},
                "work": {
                    "baseband": { "demod": { "samplerate": 6000000 } },
                    "soft": { "deframer": {} },
                    "products": { "decode": {} }
                }
            }
        }"#;
        let mut registry = Registry::new();
        registry.register_stub("demod");
        registry.register_stub("deframer");
        registry.register_stub("decode");
        let pipelines = parse_pipelines(json, &registry).unwrap();
        assert_eq!(pipelines.len(), 1);
        let levels: Vec<&str> = pipelines[0].steps.iter().map(|s| s.level_name.as_str()).collect();
        assert_eq!(levels, vec!["baseband", "soft", "products"]);
    }

    #[test]
    fn pipeline_with_unregistered_module_is_skipped() {
        let json = r#"{
            "p": { "name": "P", "parameters": {}, "work": { "a": { "missing_module": {} } } }
        }"#;
        let registry = Registry::new();
        let pipelines = parse_pipelines(json, &registry).unwrap();
        assert!(pipelines.is_empty());
    }

    #[test]
    fn input_override_is_extracted_from_module_parameters() {
        let json = r#"{
            "p": { "name": "P", "parameters": {}, "work": {
                "a": { "demod": { "input_override": "foo.bin" } }
            }}
        }"#;
        let mut registry = Registry::new();
        registry.register_stub("demod");
        let pipelines = parse_pipelines(json, &registry).unwrap();
        assert_eq!(
            pipelines[0].steps[0].modules[0].input_override.as_deref(),
            Some("foo.bin")
        );
    }

    #[test]
    fn resolves_json_inc_include_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let inc_path = dir.path().join("modcod.json.inc");
        std::fs::write(&inc_path, r#"{ "demod": { "modcod": 4 } }"#).unwrap();
        let main_path = dir.path().join("main.json");
        let mut f = std::fs::File::create(&main_path).unwrap();
        write!(
            f,
            r#"{{ "p": {{ "name": "P", "parameters": {{}}, "work": {{ "a": "modcod.json.inc" }} }} }}"#
        )
        .unwrap();
        drop(f);
        let resolved = resolve_includes(&main_path).unwrap();
        assert!(resolved.contains("\"modcod\""));
    }

    #[test]
    fn prepare_parameters_pipeline_value_wins_on_conflict() {
        let module_params = serde_json::json!({ "samplerate": 6_000_000 });
        let pipeline_params = serde_json::json!({ "samplerate": 8_000_000 });
        let merged = prepare_parameters(&module_params, &pipeline_params);
        assert_eq!(merged["samplerate"], 8_000_000);
    }

    #[test]
    fn prepare_parameters_adds_keys_module_never_declared() {
        let module_params = serde_json::json!({ "samplerate": 6_000_000 });
        let pipeline_params = serde_json::json!({ "pilots": true });
        let merged = prepare_parameters(&module_params, &pipeline_params);
        assert_eq!(merged["samplerate"], 6_000_000);
        assert_eq!(merged["pilots"], true);
    }
}
