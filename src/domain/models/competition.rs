//! Competition templates.
//!
//! A competition declares three prompts (task generation, question, answer
//! evaluation) and the closed set of metric names the evaluation must return.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};

/// Named values substituted into a [`PromptTemplate`].
pub type PromptVars = HashMap<&'static str, String>;

/// Ordered, closed set of metric names for one competition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet(Vec<String>);

impl MetricSet {
    /// Metric set in the given order.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// Metric names in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.0
    }

    /// Whether `key` is one of the metrics.
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }

    /// Number of metrics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no metric is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A prompt with `{name}` placeholders for its declared variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: &'static str,
    variables: &'static [&'static str],
}

impl PromptTemplate {
    /// Template text and the placeholders it declares.
    pub const fn new(text: &'static str, variables: &'static [&'static str]) -> Self {
        Self { text, variables }
    }

    /// Placeholder names `render` requires.
    pub fn variables(&self) -> &'static [&'static str] {
        self.variables
    }

    /// Substitute every declared variable. Braces that are not a declared
    /// placeholder (for example an inline JSON example) are left as-is.
    pub fn render(&self, vars: &PromptVars) -> DomainResult<String> {
        let mut rendered = self.text.to_string();
        for name in self.variables {
            let value = vars
                .get(name)
                .ok_or_else(|| DomainError::Template(format!("missing variable '{name}'")))?;
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        Ok(rendered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompetitionKind {
    ProblemSolving,
    CreativeWriting,
    DebatePersuasion,
}

impl CompetitionKind {
    const ALL: [Self; 3] = [Self::ProblemSolving, Self::CreativeWriting, Self::DebatePersuasion];

    fn id(self) -> &'static str {
        match self {
            Self::ProblemSolving => "problem_solving",
            Self::CreativeWriting => "creative_writing",
            Self::DebatePersuasion => "debate_persuasion",
        }
    }
}

/// A competition type: identity, metrics and its three prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompetitionTemplate {
    kind: CompetitionKind,
    metrics: MetricSet,
}

impl CompetitionTemplate {
    /// Look up a built-in competition by id.
    pub fn from_id(id: &str) -> DomainResult<Self> {
        CompetitionKind::ALL
            .into_iter()
            .find(|kind| kind.id() == id)
            .map(Self::from_kind)
            .ok_or_else(|| DomainError::UnknownTemplate(id.to_string()))
    }

    /// Every built-in competition.
    pub fn all() -> Vec<Self> {
        CompetitionKind::ALL.into_iter().map(Self::from_kind).collect()
    }

    fn from_kind(kind: CompetitionKind) -> Self {
        let metrics = match kind {
            CompetitionKind::ProblemSolving => {
                MetricSet::new(["accuracy", "clarity", "depth", "reasoning"])
            }
            CompetitionKind::CreativeWriting => MetricSet::new(["creativity", "depth", "flow"]),
            CompetitionKind::DebatePersuasion => {
                MetricSet::new(["clarity", "evidence", "persuasiveness", "anticipation"])
            }
        };
        Self { kind, metrics }
    }

    /// Stable identifier, e.g. `creative_writing`.
    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    /// Human-readable name used in reports.
    pub fn name(&self) -> &'static str {
        match self.kind {
            CompetitionKind::ProblemSolving => "Problem Solving",
            CompetitionKind::CreativeWriting => "Creative Writing",
            CompetitionKind::DebatePersuasion => "Debate and persuasion",
        }
    }

    /// Metrics the evaluation prompt asks for.
    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    /// Prompt asking a worker to invent a task. No variables.
    pub fn task_generation(&self) -> PromptTemplate {
        match self.kind {
            CompetitionKind::ProblemSolving => PromptTemplate::new(
                "Find a question that may be asked to another persona in order to evaluate their \
                 problem-solving skills. The problem should be complex and require a detailed \
                 explanation or solution. Respond with the definition of the problem only, in plain \
                 sentences, without comments or instruction keywords.",
                &[],
            ),
            CompetitionKind::CreativeWriting => PromptTemplate::new(
                "Find an idea or topic that can be used as a creative writing task for another \
                 persona. Return just the idea, in plain sentences, without any additional comments \
                 or instruction keywords.",
                &[],
            ),
            CompetitionKind::DebatePersuasion => PromptTemplate::new(
                "Generate a thesis that will be used in a debate and persuasion task. Do not include \
                 any introduction, hints, header or formatting. Return just a plain thesis, clearly \
                 stating what the opponent should argue for or against.",
                &[],
            ),
        }
    }

    /// Prompt for the student. Variables: `task`.
    pub fn question(&self) -> PromptTemplate {
        match self.kind {
            CompetitionKind::ProblemSolving => PromptTemplate::new(
                "You are part of a problem-solving competition. Provide a comprehensive solution to \
                 the problem below. Your answer will be scored by someone else. Give only the \
                 solution, without an introduction.\n\nProblem: {task}\n",
                &["task"],
            ),
            CompetitionKind::CreativeWriting => PromptTemplate::new(
                "You are given a creative writing topic. Answer with a short story, poem, or \
                 descriptive passage of at most 512 words. Do not include any introduction, \
                 instructions or comments.\n\nTopic: {task}\n",
                &["task"],
            ),
            CompetitionKind::DebatePersuasion => PromptTemplate::new(
                "You are participating in a debate and argue for the following thesis:\n{task}\n\n\
                 Make your argument well-structured, evidence-based and persuasive. Prefer \
                 concise over verbose.\n",
                &["task"],
            ),
        }
    }

    /// Prompt for the master. Variables: `task`, `answer`.
    pub fn evaluation(&self) -> PromptTemplate {
        match self.kind {
            CompetitionKind::ProblemSolving => PromptTemplate::new(
                "You are a jury of a problem-solving competition. Someone was asked to solve a \
                 problem and provided an answer. Score the answer on four criteria: accuracy, \
                 clarity, depth of explanation and logical reasoning, each a value between 0.0 and \
                 1.0. Output only a JSON document mapping the keys 'accuracy', 'clarity', 'depth', \
                 'reasoning' to their scores, without formatting or comments.\n\
                 Example of an output: {\"accuracy\": 0.61, \"clarity\": 0.82, \"depth\": 0.55, \
                 \"reasoning\": 0.7}\n\nProblem: {task}\n\nAnswer to evaluate: {answer}\n",
                &["task", "answer"],
            ),
            CompetitionKind::CreativeWriting => PromptTemplate::new(
                "You are a jury of a creative writing competition. Someone was asked for a short \
                 story, poem, or descriptive passage of at most 512 words. Score the work on \
                 creativity, emotional depth and narrative flow, each a value between 0.0 and 1.0. \
                 Output only a JSON document using the keys 'creativity', 'depth', 'flow', without \
                 formatting or comments.\n\
                 Example of an output: {\"creativity\": 0.61, \"depth\": 0.82, \"flow\": 0.55}\n\n\
                 Creative writing topic: {task}\n\nWork to evaluate: {answer}\n",
                &["task", "answer"],
            ),
            CompetitionKind::DebatePersuasion => PromptTemplate::new(
                "You are an expert evaluator assessing an argument presented in a debate.\n\n\
                 The thesis is: {task}\n\nThe argument is: {answer}\n\n\
                 Score it on: clarity and structure (key: clarity), evidence and support (key: \
                 evidence), persuasiveness (key: persuasiveness), addressing counterarguments \
                 (key: anticipation). Each score is a value between 0.0 and 1.0. Output only a \
                 JSON document mapping each key to its score, without formatting or comments.\n\
                 Example of an output: {\"clarity\": 0.61, \"evidence\": 0.82, \
                 \"persuasiveness\": 0.55, \"anticipation\": 0.2}\n",
                &["task", "answer"],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id_resolves_all_builtins() {
        for template in CompetitionTemplate::all() {
            let resolved = CompetitionTemplate::from_id(template.id()).unwrap();
            assert_eq!(resolved, template);
            assert!(!resolved.metrics().is_empty());
        }
        assert!(matches!(
            CompetitionTemplate::from_id("chess"),
            Err(DomainError::UnknownTemplate(id)) if id == "chess"
        ));
    }

    #[test]
    fn test_render_substitutes_declared_variables_only() {
        let template = CompetitionTemplate::from_id("creative_writing").unwrap();
        let vars = PromptVars::from([("task", "a lighthouse".to_string()), ("answer", "A poem".to_string())]);

        let prompt = template.evaluation().render(&vars).unwrap();
        assert!(prompt.contains("Creative writing topic: a lighthouse"));
        assert!(prompt.contains("Work to evaluate: A poem"));
        assert!(prompt.contains(r#"{"creativity": 0.61"#));
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let template = CompetitionTemplate::from_id("problem_solving").unwrap();
        let vars = PromptVars::from([("task", "2 + 2".to_string())]);
        assert!(matches!(template.evaluation().render(&vars), Err(DomainError::Template(_))));
        assert!(template.question().render(&vars).is_ok());
        assert!(template.task_generation().render(&PromptVars::new()).is_ok());
    }

    #[test]
    fn test_metric_sets_match_evaluation_keys() {
        let debate = CompetitionTemplate::from_id("debate_persuasion").unwrap();
        assert_eq!(
            debate.metrics().keys(),
            ["clarity", "evidence", "persuasiveness", "anticipation"]
        );
        for key in debate.metrics().keys() {
            assert!(debate.evaluation().render(&PromptVars::from([
                ("task", String::new()),
                ("answer", String::new())
            ]))
            .unwrap()
            .contains(&format!("key: {key}")));
        }
    }
}
