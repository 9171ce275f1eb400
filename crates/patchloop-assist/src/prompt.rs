use patchloop_core::ProjectFileSet;

const FILE_SEPARATOR: &str = "\n\n---\n\n";

pub const SIMULATE_SYSTEM_PROMPT: &str = "You simulate program execution. \
Reply with a single JSON object of the form \
{\"success\": boolean, \"output\": string[], \"error\": string}. \
Omit \"error\" when the run succeeds.";

pub const FIX_SYSTEM_PROMPT: &str = "You are a world-class senior software architect.
Analyze multi-file projects to find and fix bugs.

IMPORTANT RULES:
1. Use the EXACT \"FILE_PATH\" provided in the context for the \"name\" field in your response for existing files.
2. Return the FULL content of each file you modify. Do not return snippets.
3. If a new file is required to fix the bug, you may include it in the \"fixedFiles\" array with a descriptive path-based \"name\".
4. Provide a deep analysis of why the error occurred and how your fix resolves it.

Reply with a single JSON object of the form
{\"fixedFiles\": [{\"name\": string, \"content\": string}], \"explanation\": string, \"errorAnalysis\": string}.
\"explanation\" is a brief summary of the fix, \"errorAnalysis\" the detailed root cause.";

pub fn simulate_prompt(files: &ProjectFileSet) -> String {
    let context = files
        .iter()
        .map(|f| format!("PATH: {}\nCONTENT:\n{}", f.full_path(), f.content))
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR);

    format!(
        "Simulate the execution of this multi-file project.
Consider all dependencies between files.
Describe the output exactly as it would appear in a standard terminal.
If there is a runtime bug, return success: false and provide the error message.

PROJECT FILES:
{context}"
    )
}

pub fn fix_prompt(files: &ProjectFileSet, error: &str, hint: Option<&str>) -> String {
    let context = files
        .iter()
        .map(|f| {
            format!(
                "FILE_PATH: {}\nLANGUAGE: {}\nCONTENT:\n{}",
                f.full_path(),
                f.language,
                f.content
            )
        })
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR);
    let hint = hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| format!("USER PROVIDED CONTEXT/HINT:\n{h}\n\n"))
        .unwrap_or_default();

    format!(
        "The following project failed with an execution error. Please analyze the entire project context, find the bug, and provide the corrected files.

ERROR ENCOUNTERED:
{error}

{hint}PROJECT CONTEXT:
{context}"
    )
}
