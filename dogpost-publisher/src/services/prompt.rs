//! Generation prompt
//!
//! The prompt is a pure function of the submission context so that the
//! same inputs always produce the same request.

use crate::types::ContentContext;

/// Category placeholder when the submitter left it blank
const DEFAULT_CATEGORY: &str = "daily";

/// Memo placeholder when the submitter left it blank
const DEFAULT_MEMO: &str = "none";

/// Location placeholder when nothing is known
const UNKNOWN_LOCATION: &str = "unknown";

/// Build the article prompt for one submission
///
/// `language` is the language the article should be written in.
pub fn build_prompt(context: &ContentContext, language: &str) -> String {
    let location = context.location_text.as_deref().unwrap_or(UNKNOWN_LOCATION);
    let category = context.category.as_deref().unwrap_or(DEFAULT_CATEGORY);
    let memo = context.memo.as_deref().unwrap_or(DEFAULT_MEMO);

    let mut prompt = format!(
        "You are a professional blogger writing about a dog. Using the attached photo and the \
         information below, write a blog article in {language}.\n\
         \n\
         [Input]\n\
         - Location: {location}\n\
         - Category: {category}\n\
         - Memo: {memo}\n\
         \n\
         [Requirements]\n\
         - Output a single JSON object only. Do not wrap it in a Markdown code block.\n\
         - \"filename\": English words describing the photo, in kebab-case, without an extension.\n\
         - \"title\": an engaging title of at most 30 characters.\n\
         - \"content\": the article body in Markdown. Weave in the location and memo naturally.\n\
         - \"tags\": an array of tag strings.\n"
    );

    if context.location_text.is_some() {
        prompt.push_str(
            "\n\
             [Voice]\n\
             - Write as a neutral visitor observing the place from outside. Never write in the \
             first person as the business or facility itself.\n\
             - When the photo or the information does not make something certain, use hedged \
             wording such as \"appears to be\" instead of stating it as fact.\n",
        );
    }

    prompt
}
