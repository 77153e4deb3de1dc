use globset::{GlobBuilder, GlobMatcher};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::spec::{EnumPatternMode, SpecWalkOptions, TreeError};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypePatternSeq {
    /// Substring patterns, lowercased up front when matching ignores case.
    Literal {
        l_patterns: Vec<String>,
        if_ignore_case: bool,
    },
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

impl TypePatternSeq {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Literal {
                l_patterns,
                if_ignore_case,
            } => {
                if *if_ignore_case {
                    let value = value.to_lowercase();
                    l_patterns.iter().any(|p| value.contains(p.as_str()))
                } else {
                    l_patterns.iter().any(|p| value.contains(p.as_str()))
                }
            }
            Self::Glob(v) => v.iter().any(|p| p.is_match(value)),
            Self::Regex(v) => v.iter().any(|p| p.is_match(value)),
        }
    }
}

/// Compiled walker filters, matched against entry names.
#[derive(Debug, Clone, Default)]
pub(crate) struct SpecWalkPatterns {
    pub(crate) patterns_include_files: Option<TypePatternSeq>,
    pub(crate) patterns_exclude_files: Option<TypePatternSeq>,
    pub(crate) patterns_exclude_dirs: Option<TypePatternSeq>,
}

impl SpecWalkPatterns {
    pub(crate) fn from_options(spec_walk_options: &SpecWalkOptions) -> Result<Self, TreeError> {
        let enum_rule_pattern = spec_walk_options.rule_pattern;
        let if_ignore_case = spec_walk_options.if_ignore_case;
        Ok(Self {
            patterns_include_files: _compile(
                spec_walk_options.patterns_include_files.as_deref(),
                enum_rule_pattern,
                if_ignore_case,
            )?,
            patterns_exclude_files: _compile(
                spec_walk_options.patterns_exclude_files.as_deref(),
                enum_rule_pattern,
                if_ignore_case,
            )?,
            patterns_exclude_dirs: _compile(
                spec_walk_options.patterns_exclude_dirs.as_deref(),
                enum_rule_pattern,
                if_ignore_case,
            )?,
        })
    }

    pub(crate) fn is_dir_excluded(&self, name: &str) -> bool {
        should_exclude_by_patterns(name, None, self.patterns_exclude_dirs.as_ref())
    }

    pub(crate) fn is_file_excluded(&self, name: &str) -> bool {
        should_exclude_by_patterns(
            name,
            self.patterns_include_files.as_ref(),
            self.patterns_exclude_files.as_ref(),
        )
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumPatternMode,
    if_ignore_case: bool,
) -> Result<Option<TypePatternSeq>, TreeError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumPatternMode::Literal => {
            let l_patterns = if if_ignore_case {
                patterns.iter().map(|p| p.to_lowercase()).collect()
            } else {
                patterns.to_vec()
            };
            Ok(Some(TypePatternSeq::Literal {
                l_patterns,
                if_ignore_case,
            }))
        }
        EnumPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = GlobBuilder::new(pattern)
                    .case_insensitive(if_ignore_case)
                    .build()
                    .map_err(|e| {
                        TreeError::InvalidPattern(format!(
                            "Invalid pattern in include/exclude: {e}"
                        ))
                    })?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypePatternSeq::Glob(l_glob)))
        }
        EnumPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(if_ignore_case)
                    .build()
                    .map_err(|e| {
                        TreeError::InvalidPattern(format!(
                            "Invalid pattern in include/exclude: {e}"
                        ))
                    })?;
                l_regex.push(regex);
            }
            Ok(Some(TypePatternSeq::Regex(l_regex)))
        }
    }
}

pub(crate) fn should_exclude_by_patterns(
    value: &str,
    patterns_include: Option<&TypePatternSeq>,
    patterns_exclude: Option<&TypePatternSeq>,
) -> bool {
    let b_included = patterns_include.is_none_or(|p| p.is_match(value));
    let b_excluded = patterns_exclude.is_some_and(|p| p.is_match(value));
    !b_included || b_excluded
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workers

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

/// Run independent tasks on a bounded rayon pool, preserving input order in
/// the results. Falls back to serial execution when `n_workers_max <= 1` or
/// the pool cannot be built; the latter is recorded in `l_warnings`.
pub(crate) fn run_tasks<T, R, F>(
    l_tasks: Vec<T>,
    n_workers_max: usize,
    op: F,
    l_warnings: &mut Vec<String>,
) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    if l_tasks.is_empty() {
        return Vec::new();
    }
    if n_workers_max <= 1 || l_tasks.len() == 1 {
        return l_tasks.into_iter().map(op).collect();
    }

    let thread_pool = ThreadPoolBuilder::new().num_threads(n_workers_max).build();
    let Ok(thread_pool) = thread_pool else {
        let c_warning = format!(
            "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial copy."
        );
        warn!("{c_warning}");
        l_warnings.push(c_warning);
        return l_tasks.into_iter().map(op).collect();
    };

    thread_pool.install(|| l_tasks.into_par_iter().map(op).collect())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
