//! XML instance parsing: single shops (`SPInstance`), modular production
//! lines (`modular`), and maintenance policy files (`maintPolicy`).

use hashbrown::HashMap;
use roxmltree::{Document, Node};

use crate::collections::{DefaultMap, DefaultTwoKeyMap, TwoKeyMap};
use crate::problem::{
    Instance, JobId, JobOperations, JobsTime, MachineId, MaintenancePolicy, ModuleId, ModulesTransferConstraints,
    Operation, OperationId, OperationMachineMap, ProductionLine, ShopType, TransferPoint,
};
use crate::{Delay, Result, SchedulerError};

/// A parsed input file: either a single shop or a production line.
pub enum ParsedInput {
    Shop(Instance),
    Modular(ProductionLine),
}

/// Parses an instance file, dispatching on the top-level element.
pub fn parse_file(path: &str, shop_type: ShopType) -> Result<ParsedInput> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content, path, shop_type)
}

pub fn parse_str(content: &str, name: &str, shop_type: ShopType) -> Result<ParsedInput> {
    let document =
        Document::parse(content).map_err(|e| SchedulerError::Parse(format!("{name}: {e}")))?;
    let root = document.root_element();

    match root.tag_name().name() {
        "SPInstance" => Ok(ParsedInput::Shop(parse_instance(&root, name, shop_type)?)),
        "modular" => Ok(ParsedInput::Modular(parse_production_line(
            &root, name, shop_type,
        )?)),
        other => Err(SchedulerError::Parse(format!(
            "{name}: unknown top-level element <{other}>"
        ))),
    }
}

/// Loads a maintenance policy file into the instance.
pub fn load_maintenance_policy(instance: &mut Instance, path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let document =
        Document::parse(&content).map_err(|e| SchedulerError::Parse(format!("{path}: {e}")))?;
    let root = document.root_element();
    if root.tag_name().name() != "maintPolicy" {
        return Err(SchedulerError::Parse(format!(
            "{path}: expected <maintPolicy>"
        )));
    }

    let number_of_types = child(&root, "numberOfTypes")
        .and_then(|n| n.text())
        .map(|t| parse_number::<u32>(t, "numberOfTypes"))
        .transpose()?
        .unwrap_or(0);
    let minimum_idle = child(&root, "minimumIdle")
        .and_then(|n| n.text())
        .map(|t| parse_number::<Delay>(t, "minimumIdle"))
        .transpose()?
        .unwrap_or(0);

    let mut durations = HashMap::new();
    let mut default_duration = 0;
    if let Some(node) = child(&root, "maintProcTimes") {
        default_duration = attr_or(&node, "default", 0)?;
        for p in node.children().filter(|c| c.has_tag_name("p")) {
            let id: u32 = attr(&p, "id")?;
            let value: Delay = attr(&p, "value")?;
            durations.insert(id, value);
        }
    }

    let mut thresholds = HashMap::new();
    let mut default_threshold = 0;
    if let Some(node) = child(&root, "thresholds") {
        default_threshold = attr_or(&node, "default", 0)?;
        for t in node.children().filter(|c| c.has_tag_name("t")) {
            let id: u32 = attr(&t, "id")?;
            let min: Delay = attr(&t, "min")?;
            let max: Delay = attr(&t, "max")?;
            thresholds.insert(id, (min, max));
        }
    }

    instance.set_maintenance_policy(MaintenancePolicy::new(
        number_of_types,
        minimum_idle,
        durations,
        default_duration,
        thresholds,
        default_threshold,
    ));
    Ok(())
}

fn parse_instance(root: &Node, name: &str, shop_type: ShopType) -> Result<Instance> {
    let job_count: u32 = child(root, "jobs")
        .ok_or_else(|| SchedulerError::Parse(format!("{name}: missing <jobs>")))
        .and_then(|n| attr(&n, "count"))?;

    // flow vector: operation id -> machine, optionally per job
    let flow_node = child(root, "flowVector")
        .ok_or_else(|| SchedulerError::Parse(format!("{name}: missing <flowVector>")))?;

    let mut global_flow: Vec<(OperationId, MachineId)> = Vec::new();
    let mut per_job_flow: HashMap<JobId, Vec<(OperationId, MachineId)>> = HashMap::new();
    for component in flow_node.children().filter(|c| c.has_tag_name("component")) {
        let index: OperationId = attr(&component, "index")?;
        let machine = MachineId(attr(&component, "value")?);
        match component.attribute("job") {
            Some(job) => per_job_flow
                .entry(JobId(parse_number(job, "job")?))
                .or_default()
                .push((index, machine)),
            None => global_flow.push((index, machine)),
        }
    }
    global_flow.sort_unstable_by_key(|(index, _)| *index);
    for flow in per_job_flow.values_mut() {
        flow.sort_unstable_by_key(|(index, _)| *index);
    }

    // plexity table: how often each job visits each re-entrant machine
    let mut plexity: HashMap<JobId, HashMap<u32, u8>> = HashMap::new();
    if let Some(node) = child(root, "jobPlexity") {
        for t in node.children().filter(|c| c.has_tag_name("t")) {
            let job = JobId(attr(&t, "j")?);
            let value: u8 = attr(&t, "Type")?;
            let re_entrant: u32 = attr(&t, "id")?;
            plexity.entry(job).or_default().insert(re_entrant, value);
        }
    }

    // derive the jobs and the machine mapping, honouring reduced plexity
    let mut jobs = JobOperations::new();
    let mut mapping = OperationMachineMap::default();
    for j in 0..job_count {
        let job = JobId(j);
        let flow = per_job_flow.get(&job).unwrap_or(&global_flow);

        // count visits per machine to identify re-entrant positions
        let mut visits: HashMap<MachineId, u8> = HashMap::new();
        for (_, machine) in flow {
            *visits.entry(*machine).or_default() += 1;
        }
        let mut re_entrant_index: HashMap<MachineId, u32> = HashMap::new();
        let mut next_re_entrant = 0;
        for (_, machine) in flow {
            if visits[machine] > 1 && !re_entrant_index.contains_key(machine) {
                re_entrant_index.insert(*machine, next_re_entrant);
                next_re_entrant += 1;
            }
        }

        let mut ops = Vec::new();
        let mut seen: HashMap<MachineId, u8> = HashMap::new();
        for (op_id, machine) in flow {
            let visit = seen.entry(*machine).or_default();
            *visit += 1;

            // a job with reduced plexity skips the later passes
            if let Some(&re_id) = re_entrant_index.get(machine) {
                let allowed = plexity
                    .get(&job)
                    .and_then(|p| p.get(&re_id))
                    .copied()
                    .unwrap_or(visits[machine]);
                if *visit > allowed {
                    continue;
                }
            }

            let op = Operation::new(job, *op_id);
            ops.push(op);
            mapping.insert(op, *machine);
        }
        jobs.insert(job, ops);
    }

    // processing times
    let mut processing = DefaultMap::new(0);
    if let Some(node) = child(root, "processingTimes") {
        processing = DefaultMap::new(attr_or(&node, "default", 0)?);
        for p in node.children().filter(|c| c.has_tag_name("p")) {
            let op = Operation::new(JobId(attr(&p, "j")?), attr(&p, "op")?);
            processing.insert(op, attr(&p, "value")?);
        }
    }

    // sheet sizes
    let mut sizes = DefaultMap::new(0u32);
    let mut maximum_size = 0u32;
    if let Some(node) = child(root, "sizes") {
        let default = attr_or(&node, "default", 0u32)?;
        maximum_size = default;
        sizes = DefaultMap::new(default);
        for z in node.children().filter(|c| c.has_tag_name("z")) {
            let op = Operation::new(JobId(attr(&z, "j")?), attr(&z, "op")?);
            let value: u32 = attr(&z, "value")?;
            maximum_size = maximum_size.max(value);
            sizes.insert(op, value);
        }
    }

    // setup times, sequence-dependent (with default) and independent
    let mut setup_times = DefaultTwoKeyMap::new(0);
    if let Some(node) = child(root, "setupTimes") {
        setup_times = DefaultTwoKeyMap::new(attr_or(&node, "default", 0)?);
        for (from, to, value) in pair_entries(&node)? {
            setup_times.insert(from, to, value);
        }
    }
    let mut setup_times_indep = TwoKeyMap::new();
    if let Some(node) = child(root, "setupTimesIndep") {
        for (from, to, value) in pair_entries(&node)? {
            setup_times_indep.insert(from, to, value);
        }
    }

    // relative due dates
    let mut due_dates = TwoKeyMap::new();
    if let Some(node) = child(root, "relativeDueDates") {
        for (from, to, value) in pair_entries(&node)? {
            due_dates.insert(from, to, value);
        }
    }
    let mut due_dates_indep = TwoKeyMap::new();
    if let Some(node) = child(root, "relativeDueDatesIndep") {
        for (from, to, value) in pair_entries(&node)? {
            due_dates_indep.insert(from, to, value);
        }
    }

    // absolute due dates on the last operation of a job
    let mut absolute_due_dates = JobsTime::default();
    if let Some(node) = child(root, "absoluteDueDates") {
        for d in node.children().filter(|c| c.has_tag_name("d")) {
            absolute_due_dates.insert(JobId(attr(&d, "j")?), attr(&d, "value")?);
        }
    }

    Ok(Instance::new(
        name.to_string(),
        jobs,
        mapping,
        processing,
        setup_times,
        setup_times_indep,
        due_dates,
        due_dates_indep,
        absolute_due_dates,
        sizes,
        maximum_size,
        shop_type,
        false,
    ))
}

fn parse_production_line(root: &Node, name: &str, shop_type: ShopType) -> Result<ProductionLine> {
    let modules_node = child(root, "modules")
        .ok_or_else(|| SchedulerError::Parse(format!("{name}: missing <modules>")))?;

    let mut modules: HashMap<ModuleId, Instance> = HashMap::new();
    for shop in modules_node
        .children()
        .filter(|c| c.has_tag_name("SPInstance"))
    {
        let id = ModuleId(attr(&shop, "id")?);
        let instance = parse_instance(&shop, name, shop_type)?;
        modules.insert(id, instance);
    }

    let mut transfer = ModulesTransferConstraints::new();
    if let Some(points) = child(root, "transferPoints") {
        for point in points
            .children()
            .filter(|c| c.has_tag_name("transferPoint"))
        {
            let from = ModuleId(attr(&point, "from")?);
            let to = ModuleId(attr(&point, "to")?);
            let default_setup: Delay = attr_or(&point, "defaultSetup", 0)?;

            let mut setup_time = DefaultMap::new(default_setup);
            let mut due_date = HashMap::new();
            for entry in point.children().filter(|c| c.is_element()) {
                match entry.tag_name().name() {
                    "ts" => {
                        setup_time.insert(JobId(attr(&entry, "j")?), attr(&entry, "value")?);
                    }
                    "td" => {
                        due_date.insert(JobId(attr(&entry, "j")?), attr(&entry, "value")?);
                    }
                    _ => {}
                }
            }
            transfer.insert(
                from,
                to,
                TransferPoint {
                    setup_time,
                    due_date,
                },
            );
        }
    }

    ProductionLine::from_flow_shops(name.to_string(), modules, transfer)
}

/// Entries of the `(src, dst) -> value` tables: `<s|d j1= op1= j2= op2= value=/>`.
fn pair_entries(node: &Node) -> Result<Vec<(Operation, Operation, Delay)>> {
    let mut entries = Vec::new();
    for entry in node
        .children()
        .filter(|c| c.has_tag_name("s") || c.has_tag_name("d"))
    {
        let from = Operation::new(JobId(attr(&entry, "j1")?), attr(&entry, "op1")?);
        let to = Operation::new(JobId(attr(&entry, "j2")?), attr(&entry, "op2")?);
        entries.push((from, to, attr(&entry, "value")?));
    }
    Ok(entries)
}

fn child<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

fn attr<T: std::str::FromStr>(node: &Node, name: &str) -> Result<T> {
    let value = node.attribute(name).ok_or_else(|| {
        SchedulerError::Parse(format!(
            "<{}> is missing attribute '{name}'",
            node.tag_name().name()
        ))
    })?;
    parse_number(value, name)
}

fn attr_or<T: std::str::FromStr>(node: &Node, name: &str, default: T) -> Result<T> {
    match node.attribute(name) {
        Some(value) => parse_number(value, name),
        None => Ok(default),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| SchedulerError::Parse(format!("invalid value '{value}' for '{what}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::plexity;

    const SHOP: &str = r#"
        <SPInstance type="FORPFSSPSD">
            <jobs count="2"/>
            <flowVector>
                <component index="0" value="0"/>
                <component index="1" value="1"/>
                <component index="2" value="1"/>
                <component index="3" value="2"/>
            </flowVector>
            <processingTimes default="3">
                <p j="0" op="1" value="7"/>
            </processingTimes>
            <setupTimes default="1"/>
            <setupTimesIndep>
                <s j1="0" op1="1" j2="0" op2="2" value="90"/>
            </setupTimesIndep>
            <relativeDueDatesIndep>
                <d j1="0" op1="2" j2="0" op2="1" value="150"/>
            </relativeDueDatesIndep>
        </SPInstance>
    "#;

    #[test]
    fn parses_a_single_shop() {
        let ParsedInput::Shop(instance) =
            parse_str(SHOP, "test", ShopType::FixedOrder).unwrap()
        else {
            panic!("expected a shop");
        };
        assert_eq!(instance.number_of_jobs(), 2);
        assert_eq!(instance.machines().len(), 3);
        assert_eq!(instance.re_entrant_machines(), &[MachineId(1)]);
        assert_eq!(
            instance.processing_time(&Operation::new(JobId(0), 1)),
            7
        );
        assert_eq!(
            instance.processing_time(&Operation::new(JobId(1), 1)),
            3
        );
        assert_eq!(
            instance.query_due_date(
                &Operation::new(JobId(0), 2),
                &Operation::new(JobId(0), 1)
            ),
            Some(150)
        );
    }

    #[test]
    fn plexity_reduces_job_operations() {
        let xml = r#"
            <SPInstance type="FORPFSSPSD">
                <jobs count="2"/>
                <flowVector>
                    <component index="0" value="0"/>
                    <component index="1" value="1"/>
                    <component index="2" value="1"/>
                </flowVector>
                <jobPlexity>
                    <t j="1" Type="1" id="0"/>
                </jobPlexity>
            </SPInstance>
        "#;
        let ParsedInput::Shop(instance) = parse_str(xml, "test", ShopType::FixedOrder).unwrap()
        else {
            panic!("expected a shop");
        };
        // job 1 is simplex: its second pass is dropped
        assert_eq!(instance.job_ops(JobId(0)).len(), 3);
        assert_eq!(instance.job_ops(JobId(1)).len(), 2);
        assert_eq!(
            instance.re_entrancies_of(&Operation::new(JobId(1), 1)),
            plexity::SIMPLEX
        );
    }

    #[test]
    fn parses_a_modular_file() {
        let xml = r#"
            <modular>
                <modules>
                    <SPInstance id="0" type="FORPFSSPSD">
                        <jobs count="2"/>
                        <flowVector>
                            <component index="0" value="0"/>
                            <component index="1" value="1"/>
                            <component index="2" value="1"/>
                        </flowVector>
                    </SPInstance>
                    <SPInstance id="1" type="FORPFSSPSD">
                        <jobs count="2"/>
                        <flowVector>
                            <component index="0" value="10"/>
                        </flowVector>
                    </SPInstance>
                </modules>
                <transferPoints>
                    <transferPoint from="0" to="1" defaultSetup="4">
                        <td j="0" value="20"/>
                    </transferPoint>
                </transferPoints>
            </modular>
        "#;
        let ParsedInput::Modular(line) = parse_str(xml, "test", ShopType::FixedOrder).unwrap()
        else {
            panic!("expected a production line");
        };
        assert_eq!(line.number_of_modules(), 2);
        assert_eq!(line.transfer_setup(ModuleId(0), JobId(1)), 4);
        assert_eq!(line.transfer_due_date(ModuleId(0), JobId(0)), Some(20));
    }
}
