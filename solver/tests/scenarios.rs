//! End-to-end scenarios over literal homogeneous re-entrant instances.
//!
//! Each tuple `(load, p1, p2, unload, buffer_min, buffer_max, n_jobs)`
//! builds one loader, one duplex re-entrant machine and one unloader; the
//! expected makespans are derived by hand from the buffer windows.

use std::time::Duration;

use fms::algorithms::paths;
use fms::cli::{AlgorithmType, CliArgs};
use fms::problem::{test_instances, Instance};
use fms::solvers::{self, utils, PartialSolution};
use fms::Delay;

fn args_for(algorithm: AlgorithmType, time_out_secs: u64) -> CliArgs {
    let mut args = CliArgs::default();
    args.algorithm = algorithm;
    args.time_out = Duration::from_secs(time_out_secs);
    args
}

/// The realized schedule must satisfy every constraint edge, including the
/// chosen and inferred sequence edges.
fn assert_schedule_correct(problem: &Instance, solution: &PartialSolution) {
    let edges = solution
        .all_and_inferred_edges(problem)
        .expect("edges realize");
    let mut dg = problem.delay_graph().clone();
    let result = paths::compute_asapst_fresh_with_edges(&mut dg, &edges);
    assert!(
        !result.has_positive_cycle(),
        "realized graph has a positive cycle"
    );

    let times = solution.asapst();
    let added = dg.add_edges(&edges);
    for v in dg.vertices() {
        for (&dst, &weight) in v.outgoing() {
            let src_time = times[v.id];
            if src_time == paths::ASAP_START_VALUE {
                continue;
            }
            assert!(
                times[dst] >= src_time + weight,
                "edge {} -({})-> {} violated: {} < {}",
                v.id,
                weight,
                dst,
                times[dst],
                src_time + weight
            );
        }
    }
    dg.remove_edges(&added);

    // the reported times are exactly the longest-path times of the
    // realized graph
    assert_eq!(&result.times[..], &times[..result.times.len()]);
}

#[test]
fn scenario_trivially_feasible() {
    let mut problem = test_instances::re_entrant(863, 456, 735, 774, 13958, 15395, 2);
    let args = args_for(AlgorithmType::Bhcs, 5);
    let solution = solvers::forward::solve(&mut problem, &args).expect("feasible");
    assert!(solution.makespan() > 0);
    assert_schedule_correct(&problem, &solution);
}

#[test]
fn scenario_no_interleaving_all_solvers_agree() {
    // buffer [1, 1]: the second pass must follow its first pass
    // immediately; makespan = 1 + 50 * 2
    let expected: Delay = 101;

    let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 50);
    let solution =
        solvers::forward::solve(&mut problem, &args_for(AlgorithmType::Bhcs, 60)).unwrap();
    assert_eq!(solution.makespan(), expected);
    assert_schedule_correct(&problem, &solution);

    let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 50);
    let (solutions, _) =
        solvers::simple::solve(&mut problem, &args_for(AlgorithmType::Simple, 60)).unwrap();
    assert_eq!(solutions[0].makespan(), expected);
}

#[test]
fn scenario_small_family() {
    let expected: Delay = 11;

    let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
    let solution =
        solvers::forward::solve(&mut problem, &args_for(AlgorithmType::Bhcs, 10)).unwrap();
    assert_eq!(solution.makespan(), expected);

    let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
    let solution =
        solvers::branch_bound::solve(&mut problem, &args_for(AlgorithmType::BranchBound, 5))
            .unwrap();
    assert_eq!(solution.makespan(), expected);

    let mut problem = test_instances::re_entrant(1, 1, 1, 1, 1, 1, 5);
    let (solutions, _) =
        solvers::dd::solve(&mut problem, &args_for(AlgorithmType::Dd, 30)).unwrap();
    assert_eq!(solutions[0].makespan(), expected);
}

#[test]
fn scenario_first_passes_precede_second_passes() {
    // buffer [100, 150] admits all 14 first passes before any second pass;
    // optimum = 1 + 27 * 10 + 10
    let mut problem = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 14);
    let solution =
        solvers::branch_bound::solve(&mut problem, &args_for(AlgorithmType::BranchBound, 14))
            .unwrap();
    assert_eq!(solution.makespan(), 281);
    assert_schedule_correct(&problem, &solution);
}

#[test]
fn scenario_fully_interleaved() {
    let mut problem = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 52);
    let solution =
        solvers::branch_bound::solve(&mut problem, &args_for(AlgorithmType::BranchBound, 52))
            .unwrap();
    assert_eq!(solution.makespan(), 1041);
}

#[test]
fn scenario_slightly_loose_buffer() {
    let mut problem = test_instances::re_entrant(1, 10, 10, 1, 105, 150, 22);
    let solution =
        solvers::forward::solve(&mut problem, &args_for(AlgorithmType::Bhcs, 22)).unwrap();
    assert!(solution.makespan() >= 441);
    assert_schedule_correct(&problem, &solution);
}

#[test]
fn pareto_frontier_reaches_the_optimum() {
    let mut problem = test_instances::re_entrant(1, 10, 10, 1, 100, 150, 14);
    let mut args = args_for(AlgorithmType::Mdbhcs, 30);
    args.max_partial_solutions = 100;
    let frontier = solvers::pareto::solve(&mut problem, &args).unwrap();
    assert!(!frontier.is_empty());
    let best = frontier.iter().map(|s| s.makespan()).min().unwrap();
    assert_eq!(best, 281);
}

#[test]
fn branch_and_bound_lower_bound_never_exceeds_makespan() {
    let instances = [
        ((1, 1, 1, 1, 1, 1, 5u32), 11),
        ((1, 10, 10, 1, 100, 150, 14), 281),
    ];
    for ((load, p1, p2, unload, bmin, bmax, n), expected) in instances {
        let mut problem = test_instances::re_entrant(load, p1, p2, unload, bmin, bmax, n);
        let lb = {
            let mut p = problem.clone();
            let _ = utils::init_problem_graph(&mut p).unwrap();
            solvers::branch_bound::trivial_completion_lower_bound(&p).unwrap()
        };
        let solution = solvers::branch_bound::solve(
            &mut problem,
            &args_for(AlgorithmType::BranchBound, n as u64),
        )
        .unwrap();
        assert!(lb <= solution.makespan());
        assert_eq!(solution.makespan(), expected);
    }
}

#[test]
fn modular_broadcast_converges() {
    let mut line = test_instances::modular_line(3, 2, 5, 0);
    let mut args = args_for(AlgorithmType::Bhcs, 30);
    args.modular_options.time_out = Duration::from_secs(30);
    let (solutions, data) = solvers::broadcast::solve(&mut line, &args).unwrap();
    assert_eq!(solutions.len(), 1, "no convergence: {data}");
    let merged = &solutions[0];
    for &module_id in line.module_ids() {
        assert!(merged.module_solution(module_id).is_some());
    }
    assert!(merged.makespan() > 0);
}

#[test]
fn modular_cocktail_converges_with_transfer_due_dates() {
    let mut line = test_instances::modular_line(3, 2, 5, 50);
    let mut args = args_for(AlgorithmType::Bhcs, 30);
    args.modular_options.time_out = Duration::from_secs(30);
    args.modular_options.max_iterations = 64;
    let (solutions, data) = solvers::cocktail::solve(&mut line, &args).unwrap();
    assert_eq!(solutions.len(), 1, "no convergence: {data}");

    // boundary consistency: the separation of two jobs entering the second
    // module is at least the translated separation of their exits from the
    // first, given the transfer windows
    let merged = &solutions[0];
    let first = line.module(line.first_module_id());
    let second = line.module(line.last_module_id());
    let sol0 = merged.module_solution(line.first_module_id()).unwrap();
    let sol1 = merged.module_solution(line.last_module_id()).unwrap();

    let jobs = first.jobs_output().to_vec();
    for pair in jobs.windows(2) {
        let out0 = first.delay_graph().vertex_id(first.job_ops(pair[0]).last().unwrap()).unwrap();
        let out1 = first.delay_graph().vertex_id(first.job_ops(pair[1]).last().unwrap()).unwrap();
        let in0 = second.delay_graph().vertex_id(&second.job_ops(pair[0])[0]).unwrap();
        let in1 = second.delay_graph().vertex_id(&second.job_ops(pair[1])[0]).unwrap();

        let out_sep = sol0.asapst()[out1] - sol0.asapst()[out0];
        let in_sep = sol1.asapst()[in1] - sol1.asapst()[in0];

        // transfer window per job: [processing + setup, due]
        let setup2 = first.processing_time(first.job_ops(pair[1]).last().unwrap()) + 5;
        let due1: Delay = 50;
        assert!(in_sep >= out_sep + setup2 - due1);
    }
}
