//! Grounded prompt rendering. Everything here is pure.

use docrag_core::types::Hit;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Prefer concise, citation-backed answers.";

pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Renders `hits` as labelled context blocks inside an answer-only-from-context
/// instruction. Identical inputs always produce identical output.
pub fn build_prompt(question: &str, hits: &[Hit]) -> String {
    let context = hits
        .iter()
        .map(|h| format!("[Source: {} | Chunk: {}]\n{}", h.metadata.source_path, h.metadata.chunk_index, h.text))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR);

    format!(
        "Answer the question using ONLY the context below. \
         If the answer isn't in the context, say you don't know.\n\n\
         Question: {question}\n\n\
         Context:\n{context}\n\n\
         Then list the sources you used (file paths) at the end under \"Sources\"."
    )
}

/// Source paths of `hits` in first-seen order, without duplicates.
pub fn distinct_sources(hits: &[Hit]) -> Vec<&str> {
    let mut seen = Vec::new();
    for h in hits {
        let path = h.metadata.source_path.as_str();
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}
