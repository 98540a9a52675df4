// Clickable image link contract
// [![<title>](<image-url>)](/quote/personal/result?trimId=<trim-id>)


use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::knowledge::KnowledgeDocument;
use crate::knowledge::ingest::{BASE_TRIM_ID_LABEL, IMAGE_URL_LABEL, footer_field};

pub const QUOTE_PATH: &str = "/quote/personal/result";

static CONTRACT_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[!\[([^\]]*)\]\((\S+?)\)\]\(/quote/personal/result\?trimId=([^)\s]+)\)")
        .expect("valid regex")
});

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)\]]+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractLink {
    pub title: String,
    pub image_url: String,
    pub trim_id: String,
}

impl ContractLink {
    /// Link fields taken from a document's labelled footer
    #[inline]
    pub fn from_document(document: &KnowledgeDocument) -> Option<Self> {
        let image_url = footer_field(&document.content, IMAGE_URL_LABEL)?;
        let trim_id = footer_field(&document.content, BASE_TRIM_ID_LABEL)?;

        let title = document
            .content
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("[차량]"))
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(&document.source);

        Some(Self {
            title: title.to_string(),
            image_url: image_url.to_string(),
            trim_id: trim_id.to_string(),
        })
    }

    #[inline]
    pub fn to_markdown(&self) -> String {
        format!(
            "[![{}]({})]({}?trimId={})",
            self.title, self.image_url, QUOTE_PATH, self.trim_id
        )
    }
}

/// Links found in a generated answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCheck {
    pub links: Vec<ContractLink>,
    /// URLs that appear outside a contract link
    pub bare_urls: Vec<String>,
}

impl LinkCheck {
    #[inline]
    pub fn has_link(&self) -> bool {
        !self.links.is_empty()
    }

    #[inline]
    pub fn is_compliant(&self) -> bool {
        self.bare_urls.is_empty()
    }
}

#[inline]
pub fn check(answer: &str) -> LinkCheck {
    let links = CONTRACT_LINK_REGEX
        .captures_iter(answer)
        .filter_map(|captures| captures.ok())
        .filter_map(|captures| {
            Some(ContractLink {
                title: captures.get(1)?.as_str().to_string(),
                image_url: captures.get(2)?.as_str().to_string(),
                trim_id: captures.get(3)?.as_str().to_string(),
            })
        })
        .collect();

    let remainder = CONTRACT_LINK_REGEX.replace_all(answer, "");
    let bare_urls = URL_REGEX
        .find_iter(&remainder)
        .filter_map(|m| m.ok())
        .map(|m| m.as_str().to_string())
        .collect();

    LinkCheck { links, bare_urls }
}

/// Append the templated link of the first linkable document when the
/// answer has none. Returns the answer unchanged otherwise.
#[inline]
pub fn ensure_link(answer: String, documents: &[KnowledgeDocument]) -> String {
    if check(&answer).has_link() {
        return answer;
    }

    match documents.iter().find_map(ContractLink::from_document) {
        Some(link) => format!("{}\n\n{}", answer.trim_end(), link.to_markdown()),
        None => answer,
    }
}
