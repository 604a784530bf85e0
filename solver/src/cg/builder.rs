use hashbrown::HashSet;

use super::{ConstraintGraph, VertexId};
use crate::problem::{Instance, JobId, MachineId, Operation, ShopType};
use crate::{Result, SchedulerError};

/// Assembles the constraint graph of a problem instance.
pub struct Builder;

impl Builder {
    /// Builds the graph matching the instance's shop type, with jobs in the
    /// fixed output order.
    pub fn build(instance: &Instance) -> Result<ConstraintGraph> {
        match instance.shop_type() {
            ShopType::Job => Self::job_shop(instance),
            ShopType::Flow | ShopType::FixedOrder => {
                Self::custom_order(instance, &instance.jobs_output().to_vec())
            }
        }
    }

    /// Flow-shop graph for an explicit job permutation.
    pub fn custom_order(instance: &Instance, job_order: &[JobId]) -> Result<ConstraintGraph> {
        tracing::debug!("creating the delay graph for {}", instance.name());

        let mut dg = ConstraintGraph::new();

        add_vertices_and_sources(&mut dg, instance, job_order)?;
        add_sequence_independent_setup_times(&mut dg, instance)?;

        for (index, &job) in job_order.iter().enumerate() {
            add_intra_job_edges(&mut dg, instance, instance.job_ops(job))?;
            if index == 0 {
                // Inter-job edges look backwards, so the first job has none.
                continue;
            }
            add_inter_job_edges(&mut dg, instance, job_order, index)?;
        }

        add_sequence_independent_due_dates(&mut dg, instance)?;

        if !instance.is_out_of_order() {
            // Pin the input order with edges between first operations of
            // consecutive jobs.
            for pair in job_order.windows(2) {
                let src = Operation::new(pair[0], 0);
                let dst = Operation::new(pair[1], 0);
                let weight = instance.query(&src, &dst);
                dg.add_edge_ops(&src, &dst, weight)?;
            }
        }

        Ok(dg)
    }

    /// Job-shop graph: intra-job chains, one terminal for all jobs, and the
    /// fixed-order constraints when the shop demands them.
    pub fn job_shop(instance: &Instance) -> Result<ConstraintGraph> {
        let mut dg = ConstraintGraph::new();

        for &m in instance.machines() {
            dg.add_source(m)?;
        }

        for ops in instance.jobs().values() {
            let mut prev: Option<(Operation, VertexId)> = None;
            for &op in ops {
                let curr = dg.add_vertex(op)?;
                if let Some((prev_op, prev_id)) = prev {
                    dg.add_edge(prev_id, curr, instance.query(&prev_op, &op));
                }
                prev = Some((op, curr));
            }
        }

        let terminus = dg.add_terminus()?;
        for ops in instance.jobs().values() {
            let last = *ops.last().expect("jobs have at least one operation");
            let weight = instance.query(&last, &ConstraintGraph::OP_TERMINAL);
            let last_id = dg.vertex_id(&last)?;
            dg.add_edge(last_id, terminus, weight);
        }

        for (src, by_dst) in instance.due_dates_indep().iter() {
            for (dst, &due) in by_dst {
                dg.add_edge_ops(src, dst, -due)?;
            }
        }

        // Absolute deadlines on the completion of a job: a negative edge from
        // its last operation back to every machine source. With all sources
        // pinned at 0 this bounds the last start time from above.
        for (&job, &due) in instance.absolute_due_dates() {
            let last = *instance.job_ops(job).last().expect("non-empty job");
            let last_id = dg.vertex_id(&last)?;
            for &m in instance.machines() {
                let source = dg.source(m)?;
                dg.add_edge(last_id, source, -due);
            }
        }

        if instance.shop_type() != ShopType::FixedOrder {
            return Ok(dg);
        }

        // Fixed-order: operations on the same level follow the output order.
        // The re-entrant passes (operation ids 1 and 2) are exempt; their
        // order is the solver's decision.
        let jobs_output = instance.jobs_output();
        for i in 1..jobs_output.len() {
            for op in instance.job_ops(jobs_output[i]) {
                if op.op_id != 1 && op.op_id != 2 {
                    let src = Operation::new(jobs_output[i - 1], op.op_id);
                    let dst = Operation::new(jobs_output[i], op.op_id);
                    let weight = instance.query(&src, &dst);
                    dg.add_edge_ops(&src, &dst, weight)?;
                }
            }
        }

        Ok(dg)
    }
}

fn add_vertices_and_sources(
    dg: &mut ConstraintGraph,
    instance: &Instance,
    job_order: &[JobId],
) -> Result<()> {
    for &m in instance.machines() {
        dg.add_source(m)?;
    }

    let mut duplex_found: HashSet<MachineId> = HashSet::new();
    let mut first_job = true;

    for &job in job_order {
        for &op in instance.job_ops(job) {
            let v = dg.add_vertex(op)?;
            let machine = instance.machine(&op);
            let machine_re_entrancies = instance.machine_max_re_entrancies(machine);
            let re_entrancies = instance.re_entrancies_of(&op);

            // The source additionally feeds the first job with full plexity
            // on each re-entrant machine.
            let add_source_edge =
                re_entrancies == machine_re_entrancies && duplex_found.insert(machine);

            if first_job || add_source_edge {
                let source = dg.source(machine)?;
                // Sources are virtual events: no processing, no setup.
                dg.add_edge(source, v, 0);
            }
        }
        first_job = false;
    }
    Ok(())
}

fn add_intra_job_edges(
    dg: &mut ConstraintGraph,
    instance: &Instance,
    operations: &[Operation],
) -> Result<()> {
    for pair in operations.windows(2) {
        let (op1, op2) = (pair[0], pair[1]);
        let v1 = dg.vertex_id(&op1)?;
        let v2 = dg.vertex_id(&op2)?;
        if dg.has_edge(v1, v2) {
            // Already defined by an explicit sequence-independent setup time.
            continue;
        }
        dg.add_edge(v1, v2, instance.query(&op1, &op2));
    }
    Ok(())
}

fn add_inter_job_edges(
    dg: &mut ConstraintGraph,
    instance: &Instance,
    job_order: &[JobId],
    job_index: usize,
) -> Result<()> {
    let job = job_order[job_index];
    let machines = instance.machines();
    let first_re_entrant = instance.first_re_entrant_id();

    for &op in instance.job_ops(job) {
        let machine = instance.machine(&op);
        let is_first_machine_op = machine == machines[0];
        let is_last_op_in_machine =
            Some(&op.op_id) == instance.machine_operations(machine).last();
        let re_entrancies = instance.re_entrancies_of(&op);

        // Most recent earlier job with the same operation on the same
        // machine and a matching re-entrancy profile.
        for back in 1..=job_index {
            let job2 = job_order[job_index - back];
            let op2 = Operation::new(job2, op.op_id);
            if !instance.contains_op(&op2) || instance.machine(&op2) != machine {
                continue;
            }

            // The last operation in each machine always links consecutive
            // jobs: no overtaking on the output.
            let must_connect = back == 1 && is_last_op_in_machine;

            if instance.re_entrancies_of(&op2) != re_entrancies && !must_connect {
                continue;
            }

            if is_first_machine_op {
                if let Some(first) = first_re_entrant {
                    if instance.re_entrancies(job, first) != instance.re_entrancies(job2, first) {
                        continue;
                    }
                }
            }

            dg.add_edge_ops(&op2, &op, instance.query(&op2, &op))?;
            break;
        }
    }
    Ok(())
}

fn add_sequence_independent_setup_times(
    dg: &mut ConstraintGraph,
    instance: &Instance,
) -> Result<()> {
    for (src, by_dst) in instance.setup_times_indep().iter() {
        let processing = instance.processing_time(src);
        for (dst, &setup) in by_dst {
            dg.add_edge_ops(src, dst, processing + setup)?;
        }
    }
    Ok(())
}

fn add_sequence_independent_due_dates(
    dg: &mut ConstraintGraph,
    instance: &Instance,
) -> Result<()> {
    for (src, by_dst) in instance.due_dates_indep().iter() {
        for (dst, &due) in by_dst {
            // A deadline towards an operation that must precede the source
            // by definition can never be met.
            if src.job <= dst.job && src.op_id <= dst.op_id {
                return Err(SchedulerError::Parse(format!(
                    "infeasible due date detected between {src} and {dst}"
                )));
            }
            dg.add_edge_ops(src, dst, -due)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::paths;
    use crate::problem::test_instances;

    #[test]
    fn flow_shop_graph_is_feasible() {
        let instance = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
        let dg = Builder::build(&instance).unwrap();
        // one source per machine plus 4 ops per job
        assert_eq!(dg.num_vertices(), 3 + 4 * 5);
        let result = paths::compute_asapst_fresh(&dg);
        assert!(!result.has_positive_cycle());
    }

    #[test]
    fn due_dates_appear_as_negative_edges() {
        let instance = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 3);
        let dg = Builder::build(&instance).unwrap();
        let first = dg
            .vertex_id(&Operation::new(JobId(0), 1))
            .unwrap();
        let second = dg
            .vertex_id(&Operation::new(JobId(0), 2))
            .unwrap();
        assert_eq!(dg.weight(second, first).unwrap(), -150);
    }
}
