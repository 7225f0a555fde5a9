//! Intent routing for the chat badge.
//!
//! A query is tested against keyword groups in fixed precedence
//! (learning, developer, workflow); the first group that matches wins and
//! anything else is `rag`. The label is informational only: every query
//! takes the same retrieval and generation path.

use regex::RegexSet;

use project_context_core::models::RoutedModule;

const LEARNING_PATTERNS: &[&str] = &[
    r"\bsummari[sz]",
    r"\bdocuments?\b",
    r"\bpdfs?\b",
    r"\bconcepts?\b",
    r"\bexplain (?:the )?(?:idea|theory|paper)",
    r"\b(?:paper|article|chapter|lecture|notes)\b",
    r"\blearn(?:ing)?\b",
    r"\bkey (?:points|takeaways)\b",
];

const DEVELOPER_PATTERNS: &[&str] = &[
    r"\bcode\b",
    r"\bbugs?\b",
    r"\bdebug",
    r"\bfunctions?\b",
    r"\bstack ?traces?\b",
    r"\bexceptions?\b",
    r"\berrors?\b",
    r"\bcompil",
    r"\brefactor",
    r"\b(?:class|method|variable|api|endpoint)\b",
];

const WORKFLOW_PATTERNS: &[&str] = &[
    r"\btasks?\b",
    r"\bdeadlines?\b",
    r"\bpriorit",
    r"\bnext steps?\b",
    r"\bwork on next\b",
    r"\bwhat(?:'s| is| should i do)? next\b",
    r"\btodo\b",
    r"\b(?:roadmap|milestone|sprint|backlog|schedule)s?\b",
];

/// Compiled keyword groups, in precedence order.
pub struct IntentRouter {
    groups: Vec<(RoutedModule, RegexSet)>,
}

impl IntentRouter {
    pub fn new() -> Result<Self, regex::Error> {
        let compile = |patterns: &[&str]| {
            RegexSet::new(patterns.iter().map(|p| format!("(?i){}", p)))
        };
        Ok(Self {
            groups: vec![
                (RoutedModule::Learning, compile(LEARNING_PATTERNS)?),
                (RoutedModule::Developer, compile(DEVELOPER_PATTERNS)?),
                (RoutedModule::Workflow, compile(WORKFLOW_PATTERNS)?),
            ],
        })
    }

    pub fn route(&self, query: &str) -> RoutedModule {
        self.groups
            .iter()
            .find(|(_, set)| set.is_match(query))
            .map(|(module, _)| *module)
            .unwrap_or(RoutedModule::Rag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> IntentRouter {
        IntentRouter::new().unwrap()
    }

    #[test]
    fn test_routes_by_group() {
        let r = router();
        assert_eq!(r.route("Can you summarize this document?"), RoutedModule::Learning);
        assert_eq!(
            r.route("Why does this function throw an exception?"),
            RoutedModule::Developer
        );
        assert_eq!(r.route("What should I work on next?"), RoutedModule::Workflow);
        assert_eq!(r.route("What's the weather?"), RoutedModule::Rag);
    }

    #[test]
    fn test_precedence_learning_first() {
        // mentions both a document and code
        assert_eq!(
            router().route("Summarize the code review document"),
            RoutedModule::Learning
        );
        assert_eq!(
            router().route("Which task fixes this bug?"),
            RoutedModule::Developer
        );
    }

    #[test]
    fn test_case_insensitive_and_whole_words() {
        let r = router();
        assert_eq!(r.route("DEBUG the login flow"), RoutedModule::Developer);
        assert_eq!(r.route("Set the DEADLINE for beta"), RoutedModule::Workflow);
        // "codec" is not "code"
        assert_eq!(r.route("Which codec is fastest?"), RoutedModule::Rag);
    }

    #[test]
    fn test_empty_query_is_rag() {
        assert_eq!(router().route(""), RoutedModule::Rag);
    }
}
