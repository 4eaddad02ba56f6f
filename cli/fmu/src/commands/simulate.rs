//! `fmu simulate` — run a model and print its outputs as CSV.
//!
//! Co-simulation binaries are stepped at the communication step size.
//! Model-exchange binaries are advanced with fixed-step forward Euler and
//! event iteration after every step that signals an event.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fmu_binding::{ExperimentSetup, InstanceHandle};
use fmu_import::Importer;
use fmu_model::{BaseType, FmuKind, InterfaceGeneration, ModelDescription, Variable};

#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    pub kind: Option<FmuKind>,
    pub start: Option<f64>,
    pub stop: Option<f64>,
    pub step: Option<f64>,
}

/// Resolved time grid and binary kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    pub kind: FmuKind,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub tolerance: Option<f64>,
}

const DEFAULT_STEPS: f64 = 100.0;

impl Plan {
    /// Fill unset options from the model's default experiment.
    pub fn resolve(md: &ModelDescription, options: &SimulationOptions) -> Result<Self> {
        let kind = match options.kind {
            Some(kind) if md.supports(kind) => kind,
            Some(kind) => bail!("{} does not provide a {kind} binary", md.model_name()),
            None if md.supports(FmuKind::CoSimulation) => FmuKind::CoSimulation,
            None if md.supports(FmuKind::ModelExchange) => FmuKind::ModelExchange,
            None => bail!("{} provides no binary", md.model_name()),
        };
        let experiment = md.metadata().default_experiment.clone().unwrap_or_default();
        let start = options.start.or(experiment.start_time).unwrap_or(0.0);
        let stop = options.stop.or(experiment.stop_time).unwrap_or(start + 1.0);
        if stop <= start || !stop.is_finite() {
            bail!("stop time {stop} must be after start time {start}");
        }
        let step = options
            .step
            .or(experiment.step_size)
            .unwrap_or((stop - start) / DEFAULT_STEPS);
        if step <= 0.0 || !step.is_finite() {
            bail!("step size must be positive, got {step}");
        }
        Ok(Plan {
            kind,
            start,
            stop,
            step,
            tolerance: experiment.tolerance,
        })
    }

    /// Size of the step taken from `time`, clipped to the stop time.
    fn next_step(&self, time: f64) -> Option<f64> {
        let remaining = self.stop - time;
        (remaining > self.step * 1e-9).then(|| self.step.min(remaining))
    }
}

pub fn run(importer: &Importer, package: &Path, options: &SimulationOptions) -> Result<()> {
    let model = super::import(importer, package)?;
    let plan = Plan::resolve(model.description(), options)?;
    let mut instance = importer
        .create_instance(&model, plan.kind)
        .with_context(|| format!("instantiating the {} binary", plan.kind))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = simulate(&mut instance, &plan, &mut out);
    instance.destroy();
    result
}

/// Drive an instantiated handle over the plan, writing one CSV row per
/// communication point.
pub fn simulate(instance: &mut InstanceHandle<'_>, plan: &Plan, out: &mut dyn Write) -> Result<()> {
    let md = instance.model();
    let outputs: Vec<&Variable> = md.outputs().collect();
    writeln!(out, "{}", header(&outputs))?;

    instance
        .initialize(&ExperimentSetup {
            start_time: plan.start,
            stop_time: Some(plan.stop),
            tolerance: plan.tolerance,
        })
        .context("initializing")?;

    match plan.kind {
        FmuKind::CoSimulation => co_simulation(instance, plan, &outputs, out)?,
        FmuKind::ModelExchange => model_exchange(instance, plan, &outputs, out)?,
    }

    instance.terminate().context("terminating")?;
    Ok(())
}

fn co_simulation(
    instance: &mut InstanceHandle<'_>,
    plan: &Plan,
    outputs: &[&Variable],
    out: &mut dyn Write,
) -> Result<()> {
    let mut time = plan.start;
    write_row(instance, time, outputs, out)?;
    while let Some(h) = plan.next_step(time) {
        instance
            .do_step(time, h, true)
            .with_context(|| format!("step at t={time}"))?;
        time += h;
        write_row(instance, time, outputs, out)?;
    }
    Ok(())
}

fn model_exchange(
    instance: &mut InstanceHandle<'_>,
    plan: &Plan,
    outputs: &[&Variable],
    out: &mut dyn Write,
) -> Result<()> {
    let n = instance.model().number_of_continuous_states();
    let mut states = vec![0.0; n];
    let mut derivatives = vec![0.0; n];

    if instance.generation() == InterfaceGeneration::V2 {
        iterate_events(instance)?;
        instance.enter_continuous_time_mode()?;
    }
    instance.get_continuous_states(&mut states)?;

    let mut time = plan.start;
    write_row(instance, time, outputs, out)?;
    while let Some(h) = plan.next_step(time) {
        instance.get_derivatives(&mut derivatives)?;
        time += h;
        for (x, dx) in states.iter_mut().zip(&derivatives) {
            *x += h * dx;
        }
        instance.set_time(time)?;
        instance.set_continuous_states(&states)?;

        let (_, step) = instance
            .completed_integrator_step()
            .with_context(|| format!("completing step at t={time}"))?;
        let time_event = instance
            .last_event_info()
            .and_then(|info| info.next_event_time)
            .is_some_and(|at| at <= time);
        if step.enter_event_mode || time_event {
            if instance.generation() == InterfaceGeneration::V2 {
                instance.enter_event_mode()?;
                iterate_events(instance)?;
                instance.enter_continuous_time_mode()?;
            } else {
                iterate_events(instance)?;
            }
            instance.get_continuous_states(&mut states)?;
        }
        write_row(instance, time, outputs, out)?;

        let terminated = instance
            .last_event_info()
            .is_some_and(|info| info.terminate_simulation);
        if step.terminate_simulation || terminated {
            tracing::info!(time, "model requested termination");
            break;
        }
    }
    Ok(())
}

/// Event iteration until the model reports no further discrete change.
fn iterate_events(instance: &mut InstanceHandle<'_>) -> Result<()> {
    const MAX_ITERATIONS: usize = 1000;
    for _ in 0..MAX_ITERATIONS {
        let (_, info) = instance.event_update().context("event iteration")?;
        if !info.new_discrete_states_needed || info.terminate_simulation {
            return Ok(());
        }
    }
    bail!("event iteration did not converge after {MAX_ITERATIONS} rounds")
}

fn header(outputs: &[&Variable]) -> String {
    std::iter::once("time")
        .chain(outputs.iter().map(|v| v.name.as_str()))
        .map(csv_field)
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn write_row(
    instance: &mut InstanceHandle<'_>,
    time: f64,
    outputs: &[&Variable],
    out: &mut dyn Write,
) -> Result<()> {
    let mut fields = vec![time.to_string()];
    for variable in outputs {
        fields.push(sample(instance, variable)?);
    }
    writeln!(out, "{}", fields.join(","))?;
    Ok(())
}

fn sample(instance: &mut InstanceHandle<'_>, variable: &Variable) -> Result<String> {
    let vr = [variable.value_reference];
    let context = || format!("reading '{}'", variable.name);
    let text = match variable.base_type {
        BaseType::Real => {
            let mut value = [0.0];
            instance.get_real(&vr, &mut value).with_context(context)?;
            value[0].to_string()
        }
        BaseType::Integer | BaseType::Enumeration => {
            let mut value = [0];
            instance.get_integer(&vr, &mut value).with_context(context)?;
            value[0].to_string()
        }
        BaseType::Boolean => {
            let mut value = [false];
            instance.get_boolean(&vr, &mut value).with_context(context)?;
            value[0].to_string()
        }
        BaseType::String => {
            let mut value = [String::new()];
            instance.get_string(&vr, &mut value).with_context(context)?;
            csv_field(&value[0])
        }
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn plan_uses_default_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let (_, model) = testing::model(dir.path());
        let plan = Plan::resolve(model.description(), &SimulationOptions::default()).unwrap();
        assert_eq!(plan.kind, FmuKind::CoSimulation);
        assert_eq!(plan.start, 0.0);
        assert_eq!(plan.stop, 3.0);
        assert_eq!(plan.step, 0.01);
    }

    #[test]
    fn options_override_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let (_, model) = testing::model(dir.path());
        let options = SimulationOptions {
            kind: Some(FmuKind::ModelExchange),
            start: Some(1.0),
            stop: Some(2.0),
            step: None,
        };
        let plan = Plan::resolve(model.description(), &options).unwrap();
        assert_eq!(plan.kind, FmuKind::ModelExchange);
        assert_eq!(plan.step, 0.01);
    }

    #[test]
    fn rejects_bad_time_grid() {
        let dir = tempfile::tempdir().unwrap();
        let (_, model) = testing::model(dir.path());
        let backwards = SimulationOptions {
            start: Some(2.0),
            stop: Some(1.0),
            ..Default::default()
        };
        assert!(Plan::resolve(model.description(), &backwards).is_err());
        let zero_step = SimulationOptions {
            step: Some(0.0),
            ..Default::default()
        };
        assert!(Plan::resolve(model.description(), &zero_step).is_err());
    }

    #[test]
    fn last_step_is_clipped() {
        let plan = Plan {
            kind: FmuKind::CoSimulation,
            start: 0.0,
            stop: 1.0,
            step: 0.4,
            tolerance: None,
        };
        assert_eq!(plan.next_step(0.0), Some(0.4));
        let last = plan.next_step(0.8).unwrap();
        assert!((last - 0.2).abs() < 1e-12);
        assert_eq!(plan.next_step(1.0), None);
    }

    #[test]
    fn header_quotes_awkward_names() {
        let dir = tempfile::tempdir().unwrap();
        let (_, model) = testing::model(dir.path());
        let outputs: Vec<&Variable> = model.description().outputs().collect();
        assert_eq!(header(&outputs), "time,h,bounces");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn missing_binary_fails_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let (importer, _) = testing::model(dir.path());
        let err = run(&importer, dir.path(), &SimulationOptions::default()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("instantiating the co-simulation binary"), "{message}");
        assert!(message.contains("binary not found"), "{message}");
    }
}
