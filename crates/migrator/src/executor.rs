//! The operation executor: runs operations in a given order, retrying
//! each one's `execute` call up to its configured bound,
//! and publishes each success into [`OperationContext::results`] before
//! the next operation starts.
//!
//! Operations within one topological level carry no edges between each
//! other, so [`execute_levels`] may fan a level out across threads when
//! the caller opts in; results are still published one at a time after
//! the level joins, keeping the one-writer-per-key rule intact.

use std::any::Any;
use std::collections::BTreeMap;
use std::thread;

use migrator_providers::OperationContext;
use migrator_retry::{RetryExecutor, RetryStrategyConfig};
use migrator_types::{ErrorKind, MigrationError, OperationDefinition, OperationType};

/// One operation's runnable behavior. Implementations read whatever they
/// need out of `context` (upstream results, project key) and return a
/// value that gets published under their own `OperationType` on success.
pub trait OperationExecutable: Send + Sync {
    fn execute(&self, context: &OperationContext) -> anyhow::Result<Box<dyn Any + Send + Sync>>;
}

/// Blanket impl so a plain closure can serve as an operation body —
/// handy for tests and for simple operations with no state of their own.
impl<F> OperationExecutable for F
where
    F: Fn(&OperationContext) -> anyhow::Result<Box<dyn Any + Send + Sync>> + Send + Sync,
{
    fn execute(&self, context: &OperationContext) -> anyhow::Result<Box<dyn Any + Send + Sync>> {
        self(context)
    }
}

#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub operation_type: OperationType,
    pub success: bool,
    pub error: Option<MigrationError>,
    pub attempts: u32,
}

fn retry_config_for(def: &OperationDefinition, base: &RetryStrategyConfig) -> RetryStrategyConfig {
    let mut config = base.clone();
    if let Some(over) = &def.retry_override {
        if let Some(max_attempts) = over.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = over.base_delay_ms {
            config.base_delay = std::time::Duration::from_millis(base_delay_ms);
        }
        if let Some(max_delay_ms) = over.max_delay_ms {
            config.max_delay = std::time::Duration::from_millis(max_delay_ms);
        }
    }
    config
}

fn failure_outcome(def: &OperationDefinition, err: anyhow::Error, attempts: u32) -> OperationOutcome {
    OperationOutcome {
        operation_type: def.operation_type.clone(),
        success: false,
        error: Some(
            MigrationError::new(
                "OPERATION_FAILED",
                ErrorKind::Transient,
                format!("operation '{}' failed: {err:#}", def.operation_type),
            )
            .with_details(serde_json::json!({ "attempts": attempts })),
        ),
        attempts,
    }
}

/// Runs one operation up to its retry bound. Never panics or propagates
/// the operation's own error; failure is reported in the returned
/// outcome.
pub fn execute_operation(
    def: &OperationDefinition,
    executable: &dyn OperationExecutable,
    context: &mut OperationContext,
    base_retry: &RetryStrategyConfig,
) -> OperationOutcome {
    let retry = RetryExecutor::new(retry_config_for(def, base_retry));
    let (result, attempts) = retry.run(|_attempt| executable.execute(context));

    match result {
        Ok(value) => {
            context.results.clear(&def.operation_type);
            let _ = context.results.publish_any(def.operation_type.clone(), value);
            OperationOutcome {
                operation_type: def.operation_type.clone(),
                success: true,
                error: None,
                attempts,
            }
        }
        Err(err) => failure_outcome(def, err, attempts),
    }
}

/// Runs every operation in `ordered`, stopping at the first failure
/// unless `continue_on_error` is set.
pub fn execute_operations(
    ordered: &[OperationType],
    definitions: &BTreeMap<OperationType, OperationDefinition>,
    executables: &BTreeMap<OperationType, Box<dyn OperationExecutable>>,
    context: &mut OperationContext,
    base_retry: &RetryStrategyConfig,
    continue_on_error: bool,
) -> Vec<OperationOutcome> {
    let mut outcomes = Vec::new();
    for op_type in ordered {
        let Some(def) = definitions.get(op_type) else {
            continue;
        };
        let Some(executable) = executables.get(op_type) else {
            continue;
        };
        let outcome = execute_operation(def, executable.as_ref(), context, base_retry);
        let failed = !outcome.success;
        outcomes.push(outcome);
        if failed && !continue_on_error {
            break;
        }
    }
    outcomes
}

/// Runs levels in order; within a level, operations fan out across
/// threads when `parallel` is set (they share no edges, so any
/// interleaving is valid). A level always finishes — join, then publish —
/// before the next level starts, so downstream operations observe every
/// upstream result.
pub fn execute_levels(
    levels: &[Vec<OperationType>],
    definitions: &BTreeMap<OperationType, OperationDefinition>,
    executables: &BTreeMap<OperationType, Box<dyn OperationExecutable>>,
    context: &mut OperationContext,
    base_retry: &RetryStrategyConfig,
    continue_on_error: bool,
    parallel: bool,
) -> Vec<OperationOutcome> {
    let mut outcomes = Vec::new();
    for level in levels {
        if !parallel || level.len() < 2 {
            for op_type in level {
                let (Some(def), Some(executable)) =
                    (definitions.get(op_type), executables.get(op_type))
                else {
                    continue;
                };
                let outcome = execute_operation(def, executable.as_ref(), context, base_retry);
                let failed = !outcome.success;
                outcomes.push(outcome);
                if failed && !continue_on_error {
                    return outcomes;
                }
            }
            continue;
        }

        let shared: &OperationContext = context;
        let results: Vec<(OperationType, anyhow::Result<Box<dyn Any + Send + Sync>>, u32)> =
            thread::scope(|scope| {
                let handles: Vec<_> = level
                    .iter()
                    .filter_map(|op_type| {
                        let def = definitions.get(op_type)?;
                        let executable = executables.get(op_type)?;
                        Some(scope.spawn(move || {
                            let retry = RetryExecutor::new(retry_config_for(def, base_retry));
                            let (result, attempts) =
                                retry.run(|_attempt| executable.execute(shared));
                            (def.operation_type.clone(), result, attempts)
                        }))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("operation thread panicked"))
                    .collect()
            });

        let mut level_failed = false;
        for (op_type, result, attempts) in results {
            let def = &definitions[&op_type];
            match result {
                Ok(value) => {
                    context.results.clear(&op_type);
                    let _ = context.results.publish_any(op_type.clone(), value);
                    outcomes.push(OperationOutcome {
                        operation_type: op_type,
                        success: true,
                        error: None,
                        attempts,
                    });
                }
                Err(err) => {
                    level_failed = true;
                    outcomes.push(failure_outcome(def, err, attempts));
                }
            }
        }
        if level_failed && !continue_on_error {
            return outcomes;
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator_retry::{RetryPolicy, RetryStrategyType};
    use migrator_types::OperationDefinition;
    use std::time::Duration;

    fn context() -> OperationContext {
        OperationContext::new("run-1", "PROJ")
    }

    fn fast_retry() -> RetryStrategyConfig {
        RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    #[test]
    fn a_successful_operation_publishes_its_result() {
        let def = OperationDefinition::new("a", "a");
        let executable: Box<dyn OperationExecutable> =
            Box::new(|_ctx: &OperationContext| Ok(Box::new(42_i32) as Box<dyn Any + Send + Sync>));
        let mut ctx = context();
        let outcome = execute_operation(&def, executable.as_ref(), &mut ctx, &fast_retry());
        assert!(outcome.success);
        assert!(ctx.results.contains(&OperationType::from("a")));
    }

    #[test]
    fn a_failing_operation_reports_failure_without_panicking() {
        let def = OperationDefinition::new("a", "a");
        let executable: Box<dyn OperationExecutable> =
            Box::new(|_ctx: &OperationContext| anyhow::bail!("boom"));
        let mut ctx = context();
        let outcome = execute_operation(&def, executable.as_ref(), &mut ctx, &fast_retry());
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn retry_override_on_the_definition_wins_over_the_base_config() {
        let def = OperationDefinition::new("a", "a").with_retry_override(
            migrator_types::RetryOverride {
                max_attempts: Some(3),
                base_delay_ms: Some(0),
                max_delay_ms: Some(0),
            },
        );
        let executable: Box<dyn OperationExecutable> =
            Box::new(|_ctx: &OperationContext| anyhow::bail!("boom"));
        let mut ctx = context();
        let outcome = execute_operation(&def, executable.as_ref(), &mut ctx, &fast_retry());
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn base_config_defaults_match_the_default_policy() {
        let cfg = RetryPolicy::Default.to_config();
        let derived = retry_config_for(&OperationDefinition::new("a", "a"), &cfg);
        assert_eq!(derived.max_attempts, cfg.max_attempts);
    }

    fn two_op_fixtures() -> (
        BTreeMap<OperationType, OperationDefinition>,
        BTreeMap<OperationType, Box<dyn OperationExecutable>>,
    ) {
        let defs: BTreeMap<_, _> = [
            (OperationType::from("a"), OperationDefinition::new("a", "a")),
            (OperationType::from("b"), OperationDefinition::new("b", "b")),
        ]
        .into_iter()
        .collect();
        let mut executables: BTreeMap<OperationType, Box<dyn OperationExecutable>> = BTreeMap::new();
        executables.insert(
            OperationType::from("a"),
            Box::new(|_ctx: &OperationContext| anyhow::bail!("boom")),
        );
        executables.insert(
            OperationType::from("b"),
            Box::new(|_ctx: &OperationContext| Ok(Box::new(1_i32) as Box<dyn Any + Send + Sync>)),
        );
        (defs, executables)
    }

    #[test]
    fn execute_operations_stops_on_first_failure_by_default() {
        let (defs, executables) = two_op_fixtures();
        let mut ctx = context();
        let outcomes = execute_operations(
            &[OperationType::from("a"), OperationType::from("b")],
            &defs,
            &executables,
            &mut ctx,
            &fast_retry(),
            false,
        );
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].success);
    }

    #[test]
    fn continue_on_error_runs_every_operation() {
        let (defs, executables) = two_op_fixtures();
        let mut ctx = context();
        let outcomes = execute_operations(
            &[OperationType::from("a"), OperationType::from("b")],
            &defs,
            &executables,
            &mut ctx,
            &fast_retry(),
            true,
        );
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].success);
    }

    #[test]
    fn a_parallel_level_publishes_every_member_before_the_next_level() {
        let defs: BTreeMap<_, _> = ["a", "b", "c"]
            .into_iter()
            .map(|t| (OperationType::from(t), OperationDefinition::new(t, t)))
            .collect();
        let mut executables: BTreeMap<OperationType, Box<dyn OperationExecutable>> = BTreeMap::new();
        executables.insert(
            OperationType::from("a"),
            Box::new(|_ctx: &OperationContext| Ok(Box::new(1_i32) as Box<dyn Any + Send + Sync>)),
        );
        executables.insert(
            OperationType::from("b"),
            Box::new(|_ctx: &OperationContext| Ok(Box::new(2_i32) as Box<dyn Any + Send + Sync>)),
        );
        // "c" reads the results "a" and "b" published at the previous level.
        executables.insert(
            OperationType::from("c"),
            Box::new(|ctx: &OperationContext| {
                let a = *ctx.results.get::<i32>(&OperationType::from("a"))?;
                let b = *ctx.results.get::<i32>(&OperationType::from("b"))?;
                Ok(Box::new(a + b) as Box<dyn Any + Send + Sync>)
            }),
        );

        let levels = vec![
            vec![OperationType::from("a"), OperationType::from("b")],
            vec![OperationType::from("c")],
        ];
        let mut ctx = context();
        let outcomes =
            execute_levels(&levels, &defs, &executables, &mut ctx, &fast_retry(), false, true);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.success));
        assert_eq!(*ctx.results.get::<i32>(&OperationType::from("c")).unwrap(), 3);
    }

    #[test]
    fn a_failing_member_stops_after_its_level_completes() {
        let (defs, executables) = two_op_fixtures();
        let levels = vec![vec![OperationType::from("a"), OperationType::from("b")]];
        let mut ctx = context();
        let outcomes =
            execute_levels(&levels, &defs, &executables, &mut ctx, &fast_retry(), false, true);
        // The failure surfaces, but "b" (same level) still ran to completion.
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().any(|o| !o.success));
        assert!(ctx.results.contains(&OperationType::from("b")));
    }
}
