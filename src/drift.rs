//! Drift detection: does an answer contradict the project's constraints?
//!
//! Two layers run on every check:
//!
//! 1. **Rule layer**: a static technology taxonomy. For every category the
//!    constraints name a technology in, any *other* technology of that
//!    category mentioned by the answer is a `technology_mismatch`.
//!    Categories the constraints never mention are not checked.
//! 2. **Semantic layer**: the constraints and the answer go to the LLM at
//!    temperature 0, which returns a JSON verdict. Any failure here yields
//!    no warnings.
//!
//! Results are merged rule-layer first, de-duplicated on the first 60
//! characters of the description.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use project_context_core::models::{DriftWarning, Severity};
use project_context_core::store::Store;

use crate::context::preview;
use crate::error::{Error, Result};
use crate::llm::json::clean_json;
use crate::llm::LlmOrchestrator;
use crate::prompts::{drift_check_prompt, DRIFT_CHECK_SYSTEM_PROMPT};

/// Max chars of the answer sent to the semantic layer.
const SEMANTIC_ANSWER_CHARS: usize = 3000;
/// Length of the description prefix used for de-duplication.
const DEDUP_PREFIX_CHARS: usize = 60;

/// Category → interchangeable technologies, all lowercase.
pub const TECH_TAXONOMY: &[(&str, &[&str])] = &[
    (
        "frontend_frameworks",
        &[
            "react", "vue", "angular", "svelte", "solid", "qwik", "preact", "ember", "backbone",
            "knockout", "mithril",
        ],
    ),
    (
        "backend_frameworks",
        &[
            "fastapi", "django", "flask", "express", "nestjs", "spring", "rails", "laravel", "gin",
            "fiber", "hapi", "koa", "actix", "axum", "phoenix",
        ],
    ),
    (
        "languages",
        &[
            "python", "javascript", "typescript", "java", "kotlin", "go", "rust", "c#", "c++",
            "ruby", "php", "swift", "dart", "scala", "clojure", "elixir", "haskell",
        ],
    ),
    (
        "databases",
        &[
            "postgresql", "postgres", "mysql", "sqlite", "mongodb", "redis", "dynamodb",
            "cassandra", "cockroachdb", "supabase", "firebase", "planetscale", "fauna", "neo4j",
            "elasticsearch",
        ],
    ),
    (
        "css_frameworks",
        &[
            "tailwind", "tailwindcss", "bootstrap", "bulma", "material-ui", "mui", "chakra",
            "ant design", "antd", "shadcn", "daisyui", "mantine",
        ],
    ),
    (
        "ml_frameworks",
        &[
            "tensorflow", "pytorch", "keras", "jax", "scikit-learn", "sklearn", "xgboost",
            "lightgbm", "huggingface", "langchain", "llamaindex", "onnx",
        ],
    ),
    (
        "cloud_providers",
        &[
            "aws", "azure", "gcp", "google cloud", "vercel", "netlify", "heroku", "fly.io",
            "railway", "render",
        ],
    ),
    (
        "mobile_frameworks",
        &["react native", "flutter", "ionic", "xamarin", "capacitor", "expo"],
    ),
    (
        "testing",
        &[
            "jest", "pytest", "mocha", "vitest", "cypress", "playwright", "selenium", "junit",
            "rspec",
        ],
    ),
    (
        "state_management",
        &["redux", "zustand", "mobx", "recoil", "jotai", "pinia", "vuex", "ngrx"],
    ),
    (
        "build_tools",
        &["webpack", "vite", "parcel", "esbuild", "turbopack", "rollup", "snowpack"],
    ),
    (
        "deployment",
        &[
            "docker", "kubernetes", "k8s", "terraform", "ansible", "github actions", "gitlab ci",
            "jenkins", "circleci",
        ],
    ),
];

/// Alternate spelling → canonical taxonomy term. Both spellings stay in
/// [`TECH_TAXONOMY`] so either one is detected.
pub const TECH_ALIASES: &[(&str, &str)] = &[
    ("postgres", "postgresql"),
    ("tailwindcss", "tailwind"),
    ("mui", "material-ui"),
    ("antd", "ant design"),
    ("sklearn", "scikit-learn"),
    ("google cloud", "gcp"),
    ("k8s", "kubernetes"),
];

/// The canonical spelling of a taxonomy term.
pub fn canonical(name: &str) -> &str {
    TECH_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |&(_, canonical)| canonical)
}

struct Term {
    category: &'static str,
    name: &'static str,
    canonical: &'static str,
    pattern: Regex,
}

/// Compiled taxonomy matcher.
///
/// A term matches case-insensitively when it is neither preceded nor
/// followed by an ASCII letter or digit, so `go` does not match inside
/// `algorithm` while `c++` and `fly.io` still match.
pub struct Taxonomy {
    terms: Vec<Term>,
}

impl Taxonomy {
    pub fn new() -> std::result::Result<Self, regex::Error> {
        let mut terms = Vec::new();
        for &(category, names) in TECH_TAXONOMY {
            for &name in names {
                let pattern = Regex::new(&format!(
                    r"(?i)(?:^|[^0-9a-z]){}(?:[^0-9a-z]|$)",
                    regex::escape(name)
                ))?;
                terms.push(Term {
                    category,
                    name,
                    canonical: canonical(name),
                    pattern,
                });
            }
        }
        Ok(Self { terms })
    }

    /// `(category, term)` for every taxonomy term found in `text`, in
    /// taxonomy order.
    pub fn find(&self, text: &str) -> Vec<(&'static str, &'static str)> {
        self.terms
            .iter()
            .filter(|t| t.pattern.is_match(text))
            .map(|t| (t.category, t.name))
            .collect()
    }

    /// Whether `text` mentions the technology `canonical` under any spelling.
    fn mentions(&self, text: &str, canonical: &str) -> bool {
        self.terms
            .iter()
            .any(|t| t.canonical == canonical && t.pattern.is_match(text))
    }

    /// Rule layer: flag technologies that conflict with a stated choice in
    /// the same category. Aliases of an allowed technology are not
    /// conflicts, and each technology is flagged at most once however many
    /// of its spellings the answer uses.
    pub fn rule_based_check(&self, constraints: &[String], answer: &str) -> Vec<DriftWarning> {
        if constraints.is_empty() {
            return Vec::new();
        }

        let constraint_text = constraints.join(" ");
        // category → allowed canonical terms, in first-seen order
        let mut allowed: Vec<(&'static str, Vec<&'static str>)> = Vec::new();
        for (category, name) in self.find(&constraint_text) {
            let name = canonical(name);
            match allowed.iter_mut().find(|(c, _)| *c == category) {
                Some((_, names)) if names.contains(&name) => {}
                Some((_, names)) => names.push(name),
                None => allowed.push((category, vec![name])),
            }
        }
        if allowed.is_empty() {
            return Vec::new();
        }

        let mut flagged: HashSet<&str> = HashSet::new();
        let mut warnings = Vec::new();
        for (category, tech) in self.find(answer) {
            let Some((_, allowed_names)) = allowed.iter().find(|(c, _)| *c == category) else {
                continue;
            };
            let tech_canonical = canonical(tech);
            if allowed_names.contains(&tech_canonical) || !flagged.insert(tech_canonical) {
                continue;
            }

            let allowed_joined = allowed_names.join(", ");
            let constraint_violated = constraints
                .iter()
                .find(|c| allowed_names.iter().any(|a| self.mentions(c, a)))
                .cloned()
                .unwrap_or_else(|| allowed_joined.clone());

            warnings.push(DriftWarning {
                kind: "technology_mismatch".to_string(),
                severity: Severity::High,
                description: format!(
                    "Response suggests '{}' but project is constrained to '{}' in the {} category.",
                    tech,
                    allowed_joined,
                    category.replace('_', " ")
                ),
                constraint_violated,
            });
        }
        warnings
    }
}

#[derive(Debug, Deserialize)]
struct SemanticVerdict {
    #[serde(default)]
    has_violations: bool,
    #[serde(default)]
    violations: Vec<RawViolation>,
}

#[derive(Debug, Deserialize)]
struct RawViolation {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    constraint_violated: Option<String>,
}

impl RawViolation {
    fn normalize(self) -> DriftWarning {
        let severity = match self.severity.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("high") => Severity::High,
            Some("low") => Severity::Low,
            _ => Severity::Medium,
        };
        DriftWarning {
            kind: self
                .kind
                .filter(|k| !k.trim().is_empty())
                .unwrap_or_else(|| "other".to_string()),
            severity,
            description: self
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Constraint violation detected.".to_string()),
            constraint_violated: self.constraint_violated.unwrap_or_default(),
        }
    }
}

/// Union of both layers, rule-layer first, without repeating a warning
/// whose description starts like one already kept.
pub fn merge(rule: Vec<DriftWarning>, semantic: Vec<DriftWarning>) -> Vec<DriftWarning> {
    let mut seen: HashSet<String> = rule
        .iter()
        .map(|w| preview(&w.description, DEDUP_PREFIX_CHARS))
        .collect();
    let mut merged = rule;
    for w in semantic {
        if seen.insert(preview(&w.description, DEDUP_PREFIX_CHARS)) {
            merged.push(w);
        }
    }
    merged
}

pub struct DriftDetector {
    store: Arc<dyn Store>,
    taxonomy: Taxonomy,
    /// `None` disables the semantic layer.
    llm: Option<Arc<LlmOrchestrator>>,
}

impl DriftDetector {
    pub fn new(store: Arc<dyn Store>, llm: Option<Arc<LlmOrchestrator>>) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            taxonomy: Taxonomy::new()?,
            llm,
        })
    }

    /// Check `answer` against the constraints of `project_id`.
    ///
    /// Never fails: a missing project, a store error or a failed semantic
    /// check all produce fewer (or zero) warnings.
    pub async fn check(&self, project_id: Uuid, answer: &str) -> Vec<DriftWarning> {
        let constraints = match self.store.get_project(project_id).await {
            Ok(Some(project)) => project.constraints,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(%project_id, error = %e, "drift check could not load project");
                return Vec::new();
            }
        };

        let warnings = self.check_constraints(&constraints, answer).await;
        if !warnings.is_empty() {
            info!(%project_id, warnings = warnings.len(), "drift detected");
        }
        warnings
    }

    /// Run both layers against an explicit constraint list.
    pub async fn check_constraints(&self, constraints: &[String], answer: &str) -> Vec<DriftWarning> {
        if constraints.is_empty() {
            return Vec::new();
        }

        let rule = self.taxonomy.rule_based_check(constraints, answer);
        let semantic = match self.semantic_check(constraints, answer).await {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "semantic drift check failed, using rule layer only");
                Vec::new()
            }
        };
        merge(rule, semantic)
    }

    async fn semantic_check(&self, constraints: &[String], answer: &str) -> Result<Vec<DriftWarning>> {
        let Some(llm) = &self.llm else {
            return Ok(Vec::new());
        };

        let req = llm
            .request(drift_check_prompt(
                constraints,
                &preview(answer, SEMANTIC_ANSWER_CHARS),
            ))
            .system(DRIFT_CHECK_SYSTEM_PROMPT)
            .temperature(0.0)
            .max_tokens(1024);

        let generation = llm
            .generate(&req)
            .await
            .map_err(|e| Error::drift_check(e.to_string()))?;
        let verdict: SemanticVerdict = serde_json::from_str(clean_json(&generation.text))
            .map_err(|e| Error::drift_check(format!("response was not valid JSON: {}", e)))?;

        if !verdict.has_violations {
            return Ok(Vec::new());
        }
        Ok(verdict
            .violations
            .into_iter()
            .map(RawViolation::normalize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use project_context_core::models::Project;
    use project_context_core::store::memory::InMemoryStore;

    use crate::llm::{GenerateRequest, LlmProvider, ProviderError};

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn generate(&self, _req: &GenerateRequest) -> std::result::Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::new().unwrap()
    }

    fn constraints(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn detector_with(reply: Option<&'static str>) -> (Arc<InMemoryStore>, DriftDetector) {
        let store = Arc::new(InMemoryStore::new());
        let llm = reply.map(|r| Arc::new(LlmOrchestrator::new(Arc::new(Canned(r)), None)));
        let detector = DriftDetector::new(store.clone(), llm).unwrap();
        (store, detector)
    }

    #[test]
    fn test_postgres_constraint_flags_mongodb() {
        let warnings = taxonomy().rule_based_check(
            &constraints(&["Must use PostgreSQL for all persistence"]),
            "You could store the sessions in MongoDB instead.",
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, "technology_mismatch");
        assert_eq!(warnings[0].severity, Severity::High);
        assert!(warnings[0].constraint_violated.contains("PostgreSQL"));
        assert_eq!(
            warnings[0].description,
            "Response suggests 'mongodb' but project is constrained to 'postgresql' in the databases category."
        );
    }

    #[test]
    fn test_unconstrained_category_is_not_flagged() {
        let warnings = taxonomy().rule_based_check(
            &constraints(&["Must use PostgreSQL"]),
            "Write the service in Python with PostgreSQL.",
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_alias_of_allowed_technology_is_not_flagged() {
        let warnings = taxonomy().rule_based_check(
            &constraints(&["Must use PostgreSQL for all persistence"]),
            "Tune the Postgres connection pool.",
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_every_alias_pair_is_interchangeable() {
        let t = taxonomy();
        for &(alias, canonical_name) in TECH_ALIASES {
            let forward = t.rule_based_check(
                &[format!("Use {} only", canonical_name)],
                &format!("Configure {} for this.", alias),
            );
            assert!(forward.is_empty(), "{} flagged against {}", alias, canonical_name);

            let backward = t.rule_based_check(
                &[format!("Use {} only", alias)],
                &format!("Configure {} for this.", canonical_name),
            );
            assert!(backward.is_empty(), "{} flagged against {}", canonical_name, alias);
        }
    }

    #[test]
    fn test_two_spellings_of_one_rival_flag_once() {
        let warnings = taxonomy().rule_based_check(
            &constraints(&["Deploy with Docker Compose"]),
            "Move the services to Kubernetes (k8s) next quarter.",
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].constraint_violated, "Deploy with Docker Compose");
    }

    #[test]
    fn test_constraint_named_by_alias_is_still_cited() {
        let warnings = taxonomy().rule_based_check(
            &constraints(&["Styles use Tailwind", "Persist in postgres"]),
            "Store carts in MySQL.",
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].constraint_violated, "Persist in postgres");
        assert!(warnings[0].description.contains("'postgresql'"));
    }

    #[test]
    fn test_term_boundaries() {
        let t = taxonomy();
        assert!(t.find("a sorting algorithm").is_empty());
        let found = t.find("Port it to C++ and deploy on fly.io.");
        assert!(found.contains(&("languages", "c++")));
        assert!(found.contains(&("cloud_providers", "fly.io")));
        assert!(!t.find("We use PostgreSQL").contains(&("databases", "postgres")));
    }

    #[test]
    fn test_merge_dedupes_on_description_prefix() {
        let rule = vec![DriftWarning {
            kind: "technology_mismatch".to_string(),
            severity: Severity::High,
            description: format!("{}{}", "x".repeat(60), " rule tail"),
            constraint_violated: "c".to_string(),
        }];
        let semantic = vec![
            DriftWarning {
                kind: "other".to_string(),
                severity: Severity::Medium,
                description: format!("{}{}", "x".repeat(60), " semantic tail"),
                constraint_violated: "c".to_string(),
            },
            DriftWarning {
                kind: "other".to_string(),
                severity: Severity::Low,
                description: "something else".to_string(),
                constraint_violated: "c".to_string(),
            },
        ];
        let merged = merge(rule, semantic);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].kind, "technology_mismatch");
        assert_eq!(merged[1].description, "something else");
    }

    #[tokio::test]
    async fn test_no_constraints_no_warnings() {
        let (store, detector) = detector_with(Some(
            r#"{"has_violations": true, "violations": [{"description": "bad"}]}"#,
        ));
        let project = Project::new("p", "g");
        store.upsert_project(&project).await.unwrap();
        assert!(detector.check(project.id, "Use MongoDB").await.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_defaults_missing_fields() {
        let (store, detector) = detector_with(Some(
            "```json\n{\"has_violations\": true, \"violations\": [{\"description\": \"Adds a microservice\"}]}\n```",
        ));
        let project = Project::new("p", "g").with_constraints(["Keep a single monolith"]);
        store.upsert_project(&project).await.unwrap();

        let warnings = detector.check(project.id, "Split billing out.").await;
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, "other");
        assert_eq!(warnings[0].severity, Severity::Medium);
        assert_eq!(warnings[0].constraint_violated, "");
    }

    #[tokio::test]
    async fn test_semantic_garbage_is_soft() {
        let (store, detector) = detector_with(Some("I think it's fine!"));
        let project = Project::new("p", "g").with_constraints(["Must use PostgreSQL"]);
        store.upsert_project(&project).await.unwrap();

        let warnings = detector.check(project.id, "Try MongoDB.").await;
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, "technology_mismatch");
    }

    #[tokio::test]
    async fn test_semantic_disabled_runs_rule_layer_only() {
        let (store, detector) = detector_with(None);
        let project = Project::new("p", "g").with_constraints(["Frontend in React"]);
        store.upsert_project(&project).await.unwrap();
        let warnings = detector.check(project.id, "Rewrite the UI in Vue.").await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].description.contains("'vue'"));
    }
}
