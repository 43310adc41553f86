//! Prompt templates for the research loop.

use crate::domain::models::CodeTree;

/// Structured report schema shown to the model.
pub const REPORT_SCHEMA: &str = r#"{
  "status": "ready" | "need_more_evidence",
  "plan": string,
  "updates": string[],
  "finalConclusion": string,
  "references": string[],
  "projectBackground": string,
  "technicalOverview": string,
  "architectureFindings": [{"title": string, "judgement": string, "evidence": string[]}],
  "criticalFlows": [{"name": string, "steps": string[], "evidence": string[]}],
  "risks": [{"risk": string, "impact": string, "evidence": string[]}],
  "unknowns": string[],
  "diagrams": string[],
  "moduleSummaries": string[],
  "missingEvidence": string[],
  "nextActions": string[]
}"#;

const TREE_OVERVIEW_FILES: usize = 60;

pub fn system_prompt() -> String {
    format!(
        "You are a senior software architect researching an unfamiliar codebase.\n\
         Work in rounds. First answer with a short research plan in plain text. \
         Then use the tools to gather evidence: list directories, read skeletons, read code.\n\
         Rules:\n\
         - You may only read files that were returned by list_dir, discover_entrypoints, or earlier import expansion.\n\
         - Each file can be read once. Do not repeat reads.\n\
         - Prefer runtime source files over documentation and configuration.\n\
         - Every finding, flow and risk must cite file paths as evidence, optionally with :line or :start-end.\n\
         When your evidence is sufficient, answer with a single JSON object and nothing else:\n\
         {REPORT_SCHEMA}\n\
         Use status \"need_more_evidence\" with missingEvidence and nextActions if you cannot finish yet.\n\
         Diagrams are Mermaid sources such as `graph TD` or `sequenceDiagram`."
    )
}

/// Initial user message: the query plus a short overview of the code tree.
pub fn initial_user_prompt(query: &str, tree: &CodeTree) -> String {
    let mut prompt = format!("Research question: {query}\n\nWorkspace: {}\n", tree.root);
    if tree.is_empty() {
        prompt.push_str("The code tree is empty; start with list_dir on \".\".\n");
        return prompt;
    }
    prompt.push_str(&format!(
        "Code tree: {} files in {} directories.\nTop-level directories: {}\nSample files:\n",
        tree.files.len(),
        tree.dirs.len(),
        top_level_dirs(tree).join(", ")
    ));
    for file in tree.files.iter().take(TREE_OVERVIEW_FILES) {
        prompt.push_str("- ");
        prompt.push_str(&file.path);
        prompt.push('\n');
    }
    if tree.files.len() > TREE_OVERVIEW_FILES {
        prompt.push_str(&format!(
            "- ... {} more\n",
            tree.files.len() - TREE_OVERVIEW_FILES
        ));
    }
    prompt.push_str("Files listed here still have to be discovered with list_dir before reading.\n");
    prompt
}

fn top_level_dirs(tree: &CodeTree) -> Vec<&str> {
    tree.dirs
        .iter()
        .map(String::as_str)
        .filter(|dir| !dir.contains('/'))
        .collect()
}

pub fn retry_json_prompt() -> String {
    format!(
        "Your last answer was prose. Reply with exactly one JSON object matching this schema, without commentary:\n{REPORT_SCHEMA}"
    )
}

pub fn need_more_evidence_prompt(missing: &[String], next_actions: &[String]) -> String {
    let mut prompt = String::from("Continue gathering evidence.\n");
    if !missing.is_empty() {
        prompt.push_str(&format!("Missing evidence you stated: {}\n", missing.join("; ")));
    }
    if !next_actions.is_empty() {
        prompt.push_str(&format!("Planned next actions: {}\n", next_actions.join("; ")));
    }
    prompt.push_str("Use the tools now, then answer with the JSON report.");
    prompt
}

pub fn remediation_prompt(reason: &str) -> String {
    format!(
        "The report failed a quality check: {reason}\n\
         Fix this and answer again with the complete JSON report. \
         Cite runtime source files as evidence. This is the only correction round."
    )
}

/// Directive for evidence-depth remediation rounds.
pub fn evidence_depth_directive(source_reads: usize, required: usize, candidates: &[String]) -> String {
    let mut prompt = format!(
        "Only {source_reads} source files have been read; at least {required} are required. \
         Use only read_skeleton or read_full_code now, not list_dir."
    );
    if candidates.is_empty() {
        prompt.push_str(" Read source files you have already discovered.");
    } else {
        prompt.push_str(" Unread runtime source candidates: ");
        prompt.push_str(&candidates.join(", "));
        prompt.push('.');
    }
    prompt
}

/// Prompt for the no-tools forced finalization request.
pub fn forced_final_prompt(query: &str, plan: &str, updates: &[String], evidence: &[String]) -> String {
    let mut prompt = format!(
        "The research budget is exhausted. No tools are available.\n\
         Research question: {query}\n"
    );
    if !plan.is_empty() {
        prompt.push_str(&format!("Plan: {plan}\n"));
    }
    if !updates.is_empty() {
        prompt.push_str("Observations so far:\n");
        for update in updates {
            prompt.push_str("- ");
            prompt.push_str(update);
            prompt.push('\n');
        }
    }
    prompt.push_str("Evidence files:\n");
    if evidence.is_empty() {
        prompt.push_str("- (none)\n");
    }
    for path in evidence {
        prompt.push_str("- ");
        prompt.push_str(path);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Write the final JSON report with status \"ready\" now:\n{REPORT_SCHEMA}\n\
         Do not leave any array empty. Give best-effort content for every field \
         and record every uncertainty in unknowns instead of omitting a section."
    ));
    prompt
}
