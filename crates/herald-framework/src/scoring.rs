//! Candidate selection for structured commands.
//!
//! When several command definitions answer to the same name, each is a
//! candidate. Resolution runs in two rounds:
//!
//! 1. preconditions for every candidate; if none pass, the failure of the
//!    highest-priority candidate is reported
//! 2. parsing for every candidate that passed, then ranking by
//!    [`composite_score`]; the best successful parse wins, and if none
//!    parsed, the failure of the best-ranked attempt is reported
//!
//! Both rounds evaluate candidates concurrently. Selection is deterministic:
//! ties go to the candidate registered first.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use herald_core::{DispatchContext, ExecutionResult, Logger, ParseError, ParsedArgs};

use crate::handler::HandlerEntry;
use crate::parser::ArgumentParser;
use crate::precondition::evaluate_definition;

const SOURCE: &str = "Commands";

/// Default weight of parse confidence relative to one priority unit.
pub const DEFAULT_CONFIDENCE_WEIGHT: f64 = 0.99;

/// `priority + weight * (slot_score_sum / (2 * param_count))`, or just
/// `priority` for a command without parameters.
///
/// With `weight < 1` parse confidence can never outweigh one unit of
/// priority.
pub fn composite_score(priority: i32, param_count: usize, slot_score_sum: f64, weight: f64) -> f64 {
    let priority = f64::from(priority);
    if param_count == 0 {
        return priority;
    }
    priority + weight * (slot_score_sum / (2.0 * param_count as f64))
}

/// The outcome of resolving one command invocation.
#[derive(Debug)]
pub enum Resolution {
    /// A candidate won; run it with these arguments.
    Selected {
        entry: Arc<HandlerEntry>,
        args: ParsedArgs,
        score: f64,
    },
    /// No candidate can run; report this result.
    Rejected(ExecutionResult),
}

/// One candidate after the parse round.
struct Scored {
    entry: Arc<HandlerEntry>,
    parsed: Result<ParsedArgs, ParseError>,
    score: f64,
}

#[derive(Clone)]
pub struct CandidateScorer {
    parser: Arc<dyn ArgumentParser>,
    weight: f64,
}

impl CandidateScorer {
    pub fn new(parser: Arc<dyn ArgumentParser>, weight: f64) -> Self {
        Self { parser, weight }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Picks the candidate to run for `input` (the text after the command name).
    ///
    /// `candidates` must be in registration order.
    pub async fn resolve(
        &self,
        ctx: &Arc<DispatchContext>,
        candidates: &[Arc<HandlerEntry>],
        input: &str,
        logger: &Logger,
    ) -> Resolution {
        if candidates.is_empty() {
            let name = ctx.payload().split_whitespace().next().unwrap_or_default();
            return Resolution::Rejected(ParseError::unknown_command(name).into());
        }

        let checks = join_all(
            candidates
                .iter()
                .map(|c| evaluate_definition(c.definition(), ctx).boxed()),
        )
        .await;

        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for (entry, check) in candidates.iter().zip(checks) {
            match check {
                Ok(()) => passed.push(Arc::clone(entry)),
                Err(failure) => {
                    logger.debug(
                        SOURCE,
                        format!(
                            "Preconditions failed for command {}: {failure}",
                            entry.definition().name()
                        ),
                    );
                    failed.push((entry, failure));
                }
            }
        }

        if passed.is_empty() {
            // First registered wins among equal priorities.
            let best = failed.into_iter().reduce(|best, next| {
                if next.0.definition().priority() > best.0.definition().priority() {
                    next
                } else {
                    best
                }
            });
            return match best {
                Some((_, failure)) => Resolution::Rejected(failure.into()),
                None => Resolution::Rejected(ExecutionResult::precondition(
                    "No command passed its preconditions.",
                )),
            };
        }

        let parses = join_all(
            passed
                .iter()
                .map(|entry| self.parser.parse(ctx, entry.definition(), input)),
        )
        .await;

        let mut scored: Vec<Scored> = passed
            .into_iter()
            .zip(parses)
            .map(|(entry, outcome)| {
                let parsed = outcome.collapse();
                let definition = entry.definition();
                let sum = parsed.as_ref().map_or(0.0, ParsedArgs::score_sum);
                let score = composite_score(
                    definition.priority(),
                    definition.parameters().len(),
                    sum,
                    self.weight,
                );
                Scored {
                    entry,
                    parsed,
                    score,
                }
            })
            .collect();

        // Stable: equal scores keep registration order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut first_error = None;
        for Scored {
            entry,
            parsed,
            score,
        } in scored
        {
            match parsed {
                Ok(args) => {
                    logger.debug(
                        SOURCE,
                        format!(
                            "Selected command {} with score {score:.3}",
                            entry.definition().name()
                        ),
                    );
                    return Resolution::Selected { entry, args, score };
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        let error = first_error
            .unwrap_or_else(|| ParseError::parse_failed("No command could parse the input."));
        Resolution::Rejected(error.into())
    }
}

impl std::fmt::Debug for CandidateScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateScorer")
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}
