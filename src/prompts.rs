use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::oracle::RepairRequest;

const DEFAULT_REPAIR: &str = include_str!("default_prompts/repair.md");

const TEMPLATE_FILENAME: &str = "repair.md";

const EVAL_INSTRUCTIONS: &str = "Replace eval with ast.literal_eval and make sure the ast module \
is imported. eval is unsafe; ast.literal_eval only evaluates literal expressions.";

const CONDITION_ASSIGNMENT_INSTRUCTIONS: &str = "Check the conditional statements for an \
assignment operator (=). Conditions must use a comparison operator (==) or `is None`.";

#[derive(Serialize)]
struct RepairVars<'a> {
    language: &'a str,
    error_description: &'a str,
    problem_code: &'a str,
    context_code: &'a str,
    has_context: bool,
    special_instructions: &'a str,
    has_instructions: bool,
}

/// Extra guidance for well-known defect shapes.
fn special_instructions(request: &RepairRequest<'_>) -> &'static str {
    let description = request.error_description.to_lowercase();
    let has_condition =
        request.problem_code.contains("if") || request.problem_code.contains("while");
    if description.contains("syntax") && description.contains('=') && has_condition {
        CONDITION_ASSIGNMENT_INSTRUCTIONS
    } else if description.contains("eval") {
        EVAL_INSTRUCTIONS
    } else {
        ""
    }
}

/// Repair prompt renderer with an embedded default and optional user override.
#[derive(Debug, Clone, Default)]
pub struct PromptEngine {
    override_dir: Option<String>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// User override in `override_dir` takes precedence over the default.
    pub fn load_template(&self) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(TEMPLATE_FILENAME);
            if path.exists() {
                return Ok(std::fs::read_to_string(&path)?);
            }
        }
        Ok(DEFAULT_REPAIR.to_string())
    }

    pub fn render_repair(&self, request: &RepairRequest<'_>) -> Result<String> {
        let template = self.load_template()?;
        let instructions = special_instructions(request);
        let vars = RepairVars {
            language: request.language,
            error_description: request.error_description,
            problem_code: request.problem_code,
            context_code: request.context_code,
            has_context: !request.context_code.trim().is_empty(),
            special_instructions: instructions,
            has_instructions: !instructions.is_empty(),
        };

        let engine = upon::Engine::new();
        let rendered = engine
            .compile(template.as_str())?
            .render(&engine, &vars)
            .to_string()?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn request<'a>(code: &'a str, error: &'a str, context: &'a str) -> RepairRequest<'a> {
        RepairRequest {
            problem_code: code,
            error_description: error,
            context_code: context,
            language: "python",
        }
    }

    #[test]
    fn test_render_includes_code_and_error() {
        let engine = PromptEngine::new(None);
        let prompt = engine
            .render_repair(&request("x = eval(s)", "Use of insecure function", ""))
            .unwrap();
        assert!(prompt.contains("expert python code repair"));
        assert!(prompt.contains("```python\nx = eval(s)\n```"));
        assert!(prompt.contains("Error: Use of insecure function"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_render_omits_empty_context() {
        let engine = PromptEngine::new(None);
        let prompt = engine.render_repair(&request("pass", "fix it", "  ")).unwrap();
        assert!(!prompt.contains("Related context code"));
    }

    #[test]
    fn test_render_includes_context() {
        let engine = PromptEngine::new(None);
        let prompt = engine
            .render_repair(&request("new code", "fix it", "old code"))
            .unwrap();
        assert!(prompt.contains("Related context code"));
        assert!(prompt.contains("old code"));
    }

    #[test]
    fn test_eval_instructions() {
        let engine = PromptEngine::new(None);
        let prompt = engine
            .render_repair(&request("r = eval(e)", "Use of insecure eval", ""))
            .unwrap();
        assert!(prompt.contains("ast.literal_eval"));
    }

    #[test]
    fn test_condition_assignment_instructions() {
        let engine = PromptEngine::new(None);
        let prompt = engine
            .render_repair(&request("if x = None:", "syntax error: '=' in condition", ""))
            .unwrap();
        assert!(prompt.contains("`is None`"));
    }

    #[test]
    fn test_no_instructions_for_plain_error() {
        assert_eq!(special_instructions(&request("pass", "add type hints", "")), "");
    }

    #[test]
    fn test_override_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(TEMPLATE_FILENAME),
            "Fix {{ language }}: {{ error_description }}",
        )
        .unwrap();
        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        let prompt = engine.render_repair(&request("pass", "bad", "")).unwrap();
        assert_eq!(prompt, "Fix python: bad");
    }

    #[test]
    fn test_override_dir_without_file_uses_default() {
        let dir = TempDir::new().unwrap();
        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        let template = engine.load_template().unwrap();
        assert!(template.contains("code repair assistant"));
    }

    #[test]
    fn test_invalid_override_template_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(TEMPLATE_FILENAME), "{% if %}").unwrap();
        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        assert!(engine.render_repair(&request("pass", "bad", "")).is_err());
    }
}
