pub mod analyze;
pub mod assemble;
pub mod identify;
pub mod order;
pub mod write;

pub use analyze::RelationshipAnalyzer;
pub use assemble::TutorialAssembler;
pub use identify::AbstractionIdentifier;
pub use order::ChapterOrderer;
pub use write::ChapterWriter;

use tracing::{error, warn};

use crate::error::{ParseError, StageError};
use crate::gateway::LlmGateway;

/// Ask for a structured answer, re-prompting on parse failures.
///
/// Each clarifying re-prompt repeats the original prompt followed by the parse
/// error, so it has its own cache key. Returns the parsed value together with
/// the number of re-prompts that were needed.
pub(crate) async fn ask_structured<T, F>(
    gateway: &LlmGateway,
    stage: &'static str,
    prompt: &str,
    max_reprompts: u32,
    parse: F,
) -> Result<(T, u32), StageError>
where
    F: Fn(&str) -> Result<T, ParseError>,
{
    let mut reprompts = 0u32;
    let mut current = prompt.to_string();
    loop {
        let response = gateway.call(&current).await?;
        let err = match parse(&response) {
            Ok(value) => return Ok((value, reprompts)),
            Err(err) => err,
        };
        if reprompts >= max_reprompts {
            error!(stage, attempts = reprompts + 1, error = %err, "Model answer still malformed, giving up");
            return Err(StageError::Parse {
                attempts: reprompts + 1,
                source: err,
            });
        }
        reprompts += 1;
        warn!(stage, reprompt = reprompts, error = %err, "Malformed model answer, asking again");
        current = clarification(prompt, &err, reprompts);
    }
}

fn clarification(prompt: &str, err: &ParseError, attempt: u32) -> String {
    format!(
        "{prompt}\n\nIMPORTANT (attempt {n}): your previous answer could not be used: {err}.\n\
         Answer again with only the requested ```yaml block, following the format exactly.",
        n = attempt + 1
    )
}
