//! Cartesian product over option groups.
//!
//! Every configuration takes exactly one flag set from each group, groups are
//! visited in order and flag sets in their listed order, so run ids grow in the
//! same lexicographic order the configurations are generated in.

use falcon_ingest::RunId;
use std::mem;

/// one choice inside an option group
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagSet {
    /// feature flags appended to the configuration
    Tokens(Vec<String>),
    /// number of worker threads the benchmark should use
    Threads(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionGroup {
    pub name: String,
    pub flag_sets: Vec<FlagSet>,
}

/// a single, fully chosen configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configuration<'a> {
    pub flags: &'a [String],
    pub threads: u32,
}

/// State shared by all frames of one enumeration.
///
/// Flags are pushed before descending into the next group and truncated back
/// afterwards, so siblings always start from the same prefix.
#[derive(Debug, Clone)]
pub struct EnumerationContext {
    flags: Vec<String>,
    threads: u32,
    next_run: RunId,
}

impl EnumerationContext {
    pub fn new(default_threads: u32) -> Self {
        Self {
            flags: Vec::new(),
            threads: default_threads,
            next_run: 1,
        }
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn threads(&self) -> u32 {
        self.threads
    }

    pub fn next_run(&self) -> RunId {
        self.next_run
    }
}

/// number of runs an enumeration over `groups` will produce
pub fn run_count(groups: &[OptionGroup], repetitions: u32) -> u64 {
    groups
        .iter()
        .map(|group| group.flag_sets.len() as u64)
        .product::<u64>()
        * u64::from(repetitions)
}

/// Visit every configuration of `groups`, `repetitions` times each.
///
/// Every visit consumes one run id. An error returned by `visit` stops the
/// enumeration, the context is still restored before returning it.
pub fn enumerate<E, F>(
    groups: &[OptionGroup],
    context: &mut EnumerationContext,
    repetitions: u32,
    visit: &mut F,
) -> Result<(), E>
where
    F: FnMut(RunId, Configuration<'_>) -> Result<(), E>,
{
    let Some((group, rest)) = groups.split_first() else {
        for _ in 0..repetitions {
            let run = context.next_run;
            context.next_run += 1;

            visit(
                run,
                Configuration {
                    flags: &context.flags,
                    threads: context.threads,
                },
            )?;
        }

        return Ok(());
    };

    for flag_set in group.flag_sets.iter() {
        let result = match flag_set {
            FlagSet::Tokens(tokens) => {
                let mark = context.flags.len();
                context.flags.extend(tokens.iter().cloned());

                let result = enumerate(rest, context, repetitions, visit);
                context.flags.truncate(mark);

                result
            }
            FlagSet::Threads(threads) => {
                let previous = mem::replace(&mut context.threads, *threads);

                let result = enumerate(rest, context, repetitions, visit);
                context.threads = previous;

                result
            }
        };

        result?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeSet, convert::Infallible};

    fn tokens(flags: &[&str]) -> FlagSet {
        FlagSet::Tokens(flags.iter().map(|flag| flag.to_string()).collect())
    }

    fn group(name: &str, flag_sets: Vec<FlagSet>) -> OptionGroup {
        OptionGroup {
            name: name.to_string(),
            flag_sets,
        }
    }

    fn groups() -> Vec<OptionGroup> {
        vec![
            group("basic", vec![tokens(&["basic"])]),
            group("ycsb", vec![tokens(&["ycsb_a"]), tokens(&["ycsb_f"])]),
            group("mvcc", vec![tokens(&[]), tokens(&["mvcc"])]),
            group(
                "buffer",
                vec![tokens(&["n2db_local", "ilog"]), tokens(&["zen_local"]), tokens(&["n2db_append"])],
            ),
            group("thread_count", vec![FlagSet::Threads(1), FlagSet::Threads(48)]),
        ]
    }

    fn collect(groups: &[OptionGroup], repetitions: u32) -> (Vec<(RunId, Vec<String>, u32)>, EnumerationContext) {
        let mut context = EnumerationContext::new(16);
        let mut runs = Vec::new();

        enumerate(groups, &mut context, repetitions, &mut |run, configuration| {
            runs.push((run, configuration.flags.to_vec(), configuration.threads));
            Ok::<(), Infallible>(())
        })
        .unwrap();

        (runs, context)
    }

    #[test]
    fn visits_every_combination_once() {
        let groups = groups();
        let (runs, context) = collect(&groups, 1);

        assert_eq!(runs.len(), 2 * 2 * 3 * 2);
        assert_eq!(runs.len() as u64, run_count(&groups, 1));

        let distinct: BTreeSet<_> = runs
            .iter()
            .map(|(_, flags, threads)| (flags.clone(), *threads))
            .collect();
        assert_eq!(distinct.len(), runs.len());

        // backtracking leaves nothing behind
        assert!(context.flags().is_empty());
        assert_eq!(context.threads(), 16);
        assert_eq!(context.next_run(), 25);
    }

    #[test]
    fn order_follows_groups() {
        let (runs, _) = collect(&groups(), 1);

        assert_eq!(
            runs[0],
            (1, vec!["basic".into(), "ycsb_a".into(), "n2db_local".into(), "ilog".into()], 1)
        );
        assert_eq!(
            runs[1],
            (2, vec!["basic".into(), "ycsb_a".into(), "n2db_local".into(), "ilog".into()], 48)
        );
        assert_eq!(runs[2].1, vec!["basic", "ycsb_a", "zen_local"]);
        assert_eq!(runs[6].1, vec!["basic", "ycsb_a", "mvcc", "n2db_local", "ilog"]);
        assert_eq!(runs[12].1, vec!["basic", "ycsb_f", "n2db_local", "ilog"]);
        assert!(runs.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn repetitions_get_their_own_run_ids() {
        let groups = vec![group("ycsb", vec![tokens(&["ycsb_a"]), tokens(&["ycsb_f"])])];
        let (runs, _) = collect(&groups, 3);

        assert_eq!(
            runs.iter().map(|(run, flags, _)| (*run, flags[0].as_str())).collect::<Vec<_>>(),
            vec![
                (1, "ycsb_a"),
                (2, "ycsb_a"),
                (3, "ycsb_a"),
                (4, "ycsb_f"),
                (5, "ycsb_f"),
                (6, "ycsb_f")
            ]
        );
        assert_eq!(run_count(&groups, 3), 6);
    }

    #[test]
    fn default_threads_without_thread_group() {
        let groups = vec![group("basic", vec![tokens(&["basic"])])];
        let (runs, _) = collect(&groups, 1);

        assert_eq!(runs, vec![(1, vec!["basic".to_string()], 16)]);
    }

    #[test]
    fn empty_group_produces_nothing() {
        let groups = vec![group("basic", vec![tokens(&["basic"])]), group("empty", vec![])];
        let (runs, context) = collect(&groups, 1);

        assert!(runs.is_empty());
        assert_eq!(run_count(&groups, 1), 0);
        assert_eq!(context.next_run(), 1);
    }

    #[test]
    fn failure_stops_and_restores() {
        let mut context = EnumerationContext::new(16);
        let mut visited = 0;

        let result = enumerate(&groups(), &mut context, 1, &mut |run, _| {
            visited += 1;
            if run == 3 {
                Err("stop")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("stop"));
        assert_eq!(visited, 3);
        assert!(context.flags().is_empty());
        assert_eq!(context.threads(), 16);
    }
}
