//! Argument parsing for structured commands.
//!
//! The dispatcher only depends on the [`ArgumentParser`] contract: given a
//! context, a command definition and the raw input after the command name,
//! return a [`ParseOutcome`]. [`TokenParser`] is the built-in grammar.

mod split;

pub use split::{split_args, split_head};

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::{ArgValue, DispatchContext, ParseError, ParseOutcome, SlotParse, SlotValue, UserId};

use crate::definition::{HandlerDefinition, ParamKind, ParameterSpec};
use crate::trigger::eq_ignore_case;

/// Score of a bare numeric user id, which may just be a number.
const BARE_ID_SCORE: f64 = 0.6;

#[async_trait]
pub trait ArgumentParser: Send + Sync {
    async fn parse(
        &self,
        ctx: &Arc<DispatchContext>,
        definition: &HandlerDefinition,
        input: &str,
    ) -> ParseOutcome;
}

/// Shell-like token grammar with one token per parameter.
///
/// - missing trailing optional parameters read as [`ArgValue::Absent`]
/// - a [`ParamKind::Remainder`] parameter takes every remaining token
/// - [`ParamKind::Choice`] accepts prefixes; several matching options make
///   the slot ambiguous, scored by how much of each option was typed
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenParser;

impl TokenParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses `input` against `params` without any context.
    pub fn parse_tokens(&self, params: &[ParameterSpec], input: &str) -> ParseOutcome {
        match read_params(params, split_args(input)) {
            Ok(slots) => ParseOutcome::from_slots(slots),
            Err(err) => ParseOutcome::Failure(err),
        }
    }
}

#[async_trait]
impl ArgumentParser for TokenParser {
    async fn parse(
        &self,
        _ctx: &Arc<DispatchContext>,
        definition: &HandlerDefinition,
        input: &str,
    ) -> ParseOutcome {
        self.parse_tokens(definition.parameters(), input)
    }
}

fn read_params(params: &[ParameterSpec], tokens: Vec<String>) -> Result<Vec<SlotParse>, ParseError> {
    let takes_rest = params
        .last()
        .is_some_and(|p| p.kind == ParamKind::Remainder);
    if !takes_rest && tokens.len() > params.len() {
        return Err(ParseError::bad_arg_count(
            "The input text has too many parameters.",
        ));
    }

    let mut tokens = tokens.into_iter();
    let mut slots = Vec::with_capacity(params.len());
    for param in params {
        let slot = if param.kind == ParamKind::Remainder {
            let rest: Vec<String> = tokens.by_ref().collect();
            if rest.is_empty() {
                absent_or_missing(param)?
            } else {
                SlotParse::single(ArgValue::Text(rest.join(" ")), 1.0)
            }
        } else {
            match tokens.next() {
                Some(token) => read_token(param, &token)?,
                None => absent_or_missing(param)?,
            }
        };
        slots.push(slot);
    }
    Ok(slots)
}

fn absent_or_missing(param: &ParameterSpec) -> Result<SlotParse, ParseError> {
    if param.optional {
        Ok(SlotParse::single(ArgValue::Absent, 1.0))
    } else {
        Err(ParseError::bad_arg_count(
            "The input text has too few parameters.",
        ))
    }
}

fn read_token(param: &ParameterSpec, token: &str) -> Result<SlotParse, ParseError> {
    let failed = || {
        ParseError::parse_failed(format!(
            "Failed to parse {} as {}.",
            param.name,
            kind_name(&param.kind)
        ))
    };

    let value = match &param.kind {
        ParamKind::Text | ParamKind::Remainder => ArgValue::Text(token.to_owned()),
        ParamKind::Integer => ArgValue::Integer(token.parse().map_err(|_| failed())?),
        ParamKind::Float => ArgValue::Float(token.parse().map_err(|_| failed())?),
        ParamKind::Bool => ArgValue::Bool(read_bool(token).ok_or_else(failed)?),
        ParamKind::User => {
            let (id, score) = read_user(token).ok_or_else(failed)?;
            return Ok(SlotParse::single(ArgValue::User(id), score));
        }
        ParamKind::Choice(options) => return read_choice(options, token).ok_or_else(failed),
    };
    Ok(SlotParse::single(value, 1.0))
}

fn kind_name(kind: &ParamKind) -> &'static str {
    match kind {
        ParamKind::Text | ParamKind::Remainder => "Text",
        ParamKind::Integer => "Integer",
        ParamKind::Float => "Float",
        ParamKind::Bool => "Bool",
        ParamKind::User => "User",
        ParamKind::Choice(_) => "Choice",
    }
}

fn read_bool(token: &str) -> Option<bool> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn read_user(token: &str) -> Option<(UserId, f64)> {
    let mention = token
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.strip_prefix('!').unwrap_or(inner));
    match mention {
        Some(digits) => digits.parse().ok().map(|id| (UserId(id), 1.0)),
        None => token.parse().ok().map(|id| (UserId(id), BARE_ID_SCORE)),
    }
}

fn read_choice(options: &[String], token: &str) -> Option<SlotParse> {
    if let Some(exact) = options.iter().find(|o| eq_ignore_case(o, token)) {
        return Some(SlotParse::single(ArgValue::Text(exact.clone()), 1.0));
    }
    let lowered = token.to_lowercase();
    let values: Vec<SlotValue> = options
        .iter()
        .filter(|o| !token.is_empty() && o.to_lowercase().starts_with(&lowered))
        .map(|o| {
            let score = token.chars().count() as f64 / o.chars().count() as f64;
            SlotValue::new(ArgValue::Text(o.clone()), score)
        })
        .collect();
    (!values.is_empty()).then_some(SlotParse { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::HandlerKind;
    use herald_core::{ConversationScope, DependencyPool, InboundMessage, ParseErrorKind};

    fn params(specs: &[(&str, ParamKind, bool)]) -> Vec<ParameterSpec> {
        specs
            .iter()
            .map(|(name, kind, optional)| ParameterSpec {
                name: (*name).to_owned(),
                kind: kind.clone(),
                optional: *optional,
            })
            .collect()
    }

    fn parse(specs: &[(&str, ParamKind, bool)], input: &str) -> ParseOutcome {
        TokenParser.parse_tokens(&params(specs), input)
    }

    #[test]
    fn test_typed_values() {
        let outcome = parse(
            &[
                ("n", ParamKind::Integer, false),
                ("ratio", ParamKind::Float, false),
                ("flag", ParamKind::Bool, false),
                ("who", ParamKind::User, false),
            ],
            "5 0.5 yes <@!99>",
        );
        let args = outcome.collapse().unwrap();
        assert_eq!(args.integer(0), Some(5));
        assert_eq!(args.float(1), Some(0.5));
        assert_eq!(args.boolean(2), Some(true));
        assert_eq!(args.user(3), Some(UserId(99)));
        assert!((args.score_sum() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_bare_user_id_scores_lower() {
        let args = parse(&[("who", ParamKind::User, false)], "99")
            .collapse()
            .unwrap();
        assert_eq!(args.user(0), Some(UserId(99)));
        assert!((args.score_sum() - BARE_ID_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_parse_failure_names_parameter() {
        let ParseOutcome::Failure(err) = parse(&[("count", ParamKind::Integer, false)], "lots") else {
            panic!("expected failure");
        };
        assert_eq!(err.kind, ParseErrorKind::ParseFailed);
        assert_eq!(err.reason, "Failed to parse count as Integer.");
    }

    #[test]
    fn test_arg_counts() {
        let specs = [("a", ParamKind::Text, false), ("b", ParamKind::Text, true)];

        let ParseOutcome::Failure(err) = parse(&specs, "") else {
            panic!("expected failure");
        };
        assert_eq!(err.kind, ParseErrorKind::BadArgCount);

        let ParseOutcome::Failure(err) = parse(&specs, "x y z") else {
            panic!("expected failure");
        };
        assert_eq!(err.reason, "The input text has too many parameters.");

        let args = parse(&specs, "x").collapse().unwrap();
        assert_eq!(args.text(0), Some("x"));
        assert!(args.get(1).unwrap().is_absent());
    }

    #[test]
    fn test_remainder_takes_rest() {
        let args = parse(
            &[("target", ParamKind::Text, false), ("message", ParamKind::Remainder, false)],
            "bob hello there   friend",
        )
        .collapse()
        .unwrap();
        assert_eq!(args.text(0), Some("bob"));
        assert_eq!(args.text(1), Some("hello there friend"));
    }

    #[test]
    fn test_choice_prefix_is_ambiguous() {
        let choices = ParamKind::Choice(vec!["start".into(), "status".into(), "stop".into()]);
        let outcome = parse(&[("action", choices.clone(), false)], "sta");
        let ParseOutcome::Ambiguous(slots) = &outcome else {
            panic!("expected ambiguity");
        };
        assert_eq!(slots[0].values.len(), 2);

        // "start" is the closer completion of "sta".
        let args = outcome.collapse().unwrap();
        assert_eq!(args.text(0), Some("start"));

        let exact = parse(&[("action", choices, false)], "STOP");
        assert!(matches!(exact, ParseOutcome::Success(_)));
    }

    #[test]
    fn test_choice_exact_match_folds_non_ascii() {
        let choices = ParamKind::Choice(vec!["größe".into(), "grün".into()]);
        let outcome = parse(&[("field", choices, false)], "GRÜN");
        assert!(matches!(outcome, ParseOutcome::Success(_)));
        let args = outcome.collapse().unwrap();
        assert_eq!(args.text(0), Some("grün"));
        assert_eq!(args.score_sum(), 1.0);
    }

    #[test]
    fn test_parser_reads_definition_parameters() {
        let mut definition = HandlerDefinition::new("roll".to_owned(), HandlerKind::Command);
        definition.parameters = params(&[("sides", ParamKind::Integer, false)]);
        let ctx = Arc::new(DispatchContext::new(
            Arc::new(InboundMessage::new(1, ConversationScope::Direct, "!roll 6")),
            None,
            DependencyPool::empty(),
        ));

        let outcome = tokio_test::block_on(TokenParser.parse(&ctx, &definition, "6"));
        assert_eq!(outcome.collapse().unwrap().integer(0), Some(6));
    }
}
