//! Settings of an abstraction run.

use std::collections::BTreeSet;

use crate::embedding::EmbeddingOptions;

/// Configuration for canonicalization and materialization.
///
/// # Examples
///
/// ```
/// use hrg_rs::config::AbstractionConfig;
///
/// let config = AbstractionConfig {
///     min_dereference_depth: 2,
///     backward_confluent: true,
///     ..AbstractionConfig::default()
/// };
/// assert_eq!(config.aggressive_abstraction_threshold, 10);
/// ```
#[derive(Debug, Clone)]
pub struct AbstractionConfig {
    /// Graphs with more nodes than this are abstracted aggressively, ignoring the dereference depth (default: 10)
    pub aggressive_abstraction_threshold: usize,
    /// Abstract aggressively at return points (default: true)
    pub aggressive_return_abstraction: bool,
    /// Minimal selector distance between a variable and abstracted structure (default: 1)
    pub min_dereference_depth: usize,
    /// Whether variables naming constants count for the dereference depth (default: false)
    pub admissible_constants: bool,
    /// Variable names that denote constants (default: `null`, `true`, `false`, `0`, `1`, `-1`)
    pub constants: BTreeSet<String>,
    /// The grammar is backward confluent: stop at the first successful rewrite (default: false)
    pub backward_confluent: bool,
    /// Unify nonterminal stacks while matching (default: false)
    pub indexed: bool,
    /// Skip canonicalization at program points with a unique successor (default: true)
    pub ignore_unique_successor_points: bool,
    /// Also match rules with merged external nodes (default: true)
    pub collapsed_rules: bool,
}

impl Default for AbstractionConfig {
    fn default() -> Self {
        Self {
            aggressive_abstraction_threshold: 10,
            aggressive_return_abstraction: true,
            min_dereference_depth: 1,
            admissible_constants: false,
            constants: ["null", "true", "false", "0", "1", "-1"]
                .into_iter()
                .map(String::from)
                .collect(),
            backward_confluent: false,
            indexed: false,
            ignore_unique_successor_points: true,
            collapsed_rules: true,
        }
    }
}

impl AbstractionConfig {
    /// Embedding options for the given dereference depth.
    pub fn embedding_options(&self, min_dereference_depth: usize) -> EmbeddingOptions {
        EmbeddingOptions {
            min_dereference_depth,
            admissible_constants: self.admissible_constants,
            constants: self.constants.clone(),
            indexed: self.indexed,
        }
    }
}
