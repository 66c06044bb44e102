use voltaic::config::SimulationConfig;
use voltaic::domain::{Domain, Domains, Electrode, WHOLE_CELL};
use voltaic::expression::{concatenation, full_broadcast, primary_broadcast, Expr, Variable};
use voltaic::model::{Model, ModelBuilder};
use voltaic::parameters::LithiumIonParameters;
use voltaic::simulation::{work_precision, Simulation};
use voltaic::solvers::Termination;
use voltaic::submodels::{
    ConstantCurrent, ElectrolyteDiffusion, FastSingleSizeDistribution, PrescribedVariables, Thermal,
    ThermalOption,
};
use voltaic::{ModelError, ModelResult};

const CONFIG: &str = "tests/data/cell.toml";

fn config() -> SimulationConfig {
    SimulationConfig::load_from_file(CONFIG).unwrap()
}

fn half_cell_discharge() -> ModelResult<Model> {
    let param = LithiumIonParameters::new();
    ModelBuilder::new("size distribution discharge")
        .with_submodel(ConstantCurrent::new(param.clone()))
        .with_submodel(ElectrolyteDiffusion::new(param.clone()))
        .with_submodel(FastSingleSizeDistribution::new(param.clone(), Electrode::Negative))
        .with_submodel(FastSingleSizeDistribution::new(param, Electrode::Positive))
        .build()
}

/// Uniform electrochemistry feeding the thermal submodel: interfacial current
/// `j`, reaction overpotential `eta_r` and entropic change `dudt` in both
/// electrodes, with flat potentials and no current.
fn uniform_electrochemistry(j: f64, eta_r: f64, dudt: f64) -> PrescribedVariables {
    let on = |d: Domain| Domains::new(vec![d]).with_secondary(vec![Domain::CurrentCollector]);
    let uniform = |value: f64, d: Domain| full_broadcast(&Expr::scalar(value), on(d)).unwrap();
    let zero = |d: Domain| uniform(0.0, d);
    let (a_n, a_p) = (zero(Domain::NegativeElectrode), zero(Domain::PositiveElectrode));
    let whole = concatenation(WHOLE_CELL.iter().map(|d| zero(*d)).collect()).unwrap();
    let i_cc = primary_broadcast(&Expr::scalar(0.0), vec![Domain::CurrentCollector]).unwrap();
    PrescribedVariables::new("uniform electrochemistry")
        .with("Negative electrode interfacial current density", uniform(j, Domain::NegativeElectrode))
        .with("Positive electrode interfacial current density", uniform(j, Domain::PositiveElectrode))
        .with("Negative electrode reaction overpotential", uniform(eta_r, Domain::NegativeElectrode))
        .with("Positive electrode reaction overpotential", uniform(eta_r, Domain::PositiveElectrode))
        .with("Negative electrode entropic change", uniform(dudt, Domain::NegativeElectrode))
        .with("Positive electrode entropic change", uniform(dudt, Domain::PositiveElectrode))
        .with("Electrolyte potential", whole.clone())
        .with("Electrolyte current density", whole)
        .with("Negative electrode potential", a_n.clone())
        .with("Negative electrode current density", a_n)
        .with("Positive electrode potential", a_p.clone())
        .with("Positive electrode current density", a_p)
        .with("Current collector current density", i_cc)
}

fn zero_electrochemistry() -> PrescribedVariables {
    uniform_electrochemistry(0.0, 0.0, 0.0)
}

#[test]
fn test_discharge_stops_at_surface_concentration_limit() {
    let mut sim = Simulation::new(half_cell_discharge().unwrap(), config());
    let solution = sim.solve().unwrap();

    // Smallest positive particles (R = 0.25) fill at rate 3 j / (a gamma R) = 9
    let expected = (1.0 - 1e-4 - 0.6) / 9.0;
    assert_eq!(
        solution.termination,
        Termination::Event("Maximum positive particle surface concentration".to_string())
    );
    let t_end = *solution.t.last().unwrap();
    assert!((t_end - expected).abs() < 1e-6, "terminated at {}", t_end);

    let model = sim.discretised().unwrap();
    let c_p = model
        .process_variable("X-averaged positive particle surface concentration distribution")
        .unwrap();
    let last = solution.evaluate(&c_p).pop().unwrap();
    let peak = last.iter().copied().fold(f64::MIN, f64::max);
    assert!((peak - (1.0 - 1e-4)).abs() < 1e-8);

    // Lithium leaves the negative particles
    let c_n = model
        .process_variable("X-averaged negative particle surface concentration distribution")
        .unwrap();
    let values = solution.evaluate(&c_n);
    assert!(values.last().unwrap().iter().all(|c| *c < 0.8));
}

#[test]
fn test_no_current_keeps_particles_at_rest() {
    let config = config().with_parameter("Current function", 0.0);
    let mut sim = Simulation::new(half_cell_discharge().unwrap(), config);
    let solution = sim.solve().unwrap();
    assert_eq!(solution.termination, Termination::FinalTime);
    assert_eq!(solution.t.len(), 21);

    let model = sim.discretised().unwrap();
    assert!(model.rhs(0.0, model.y0()).iter().all(|r| r.abs() < 1e-12));
    let last = solution.last_state().unwrap();
    for (y, y0) in last.iter().zip(model.y0()) {
        assert!((y - y0).abs() < 1e-12);
    }
}

#[test]
fn test_surface_concentration_events_fire_outside_tolerance_band() {
    let mut sim = Simulation::new(half_cell_discharge().unwrap(), config());
    let model = sim.build().unwrap();
    let slot = model
        .layout()
        .slot("X-averaged negative particle surface concentration distribution")
        .unwrap()
        .range();
    let index = |name: &str| model.events().iter().position(|e| e.name == name).unwrap();
    let (min_event, max_event) = (
        index("Minimum negative particle surface concentration"),
        index("Maximum negative particle surface concentration"),
    );

    let with_value = |value: f64| {
        let mut y = model.y0().to_vec();
        y[slot.start] = value;
        model.event_values(0.0, &y)
    };
    assert!(with_value(1.5e-4)[min_event] > 0.0);
    assert!(with_value(0.5e-4)[min_event] < 0.0);
    assert!(with_value(1.0 - 1.5e-4)[max_event] > 0.0);
    assert!(with_value(1.0 - 0.5e-4)[max_event] < 0.0);

    // Exactly at the tolerance the events sit on zero and have not fired
    let tol = 1e-4;
    assert_eq!(with_value(tol)[min_event], 0.0);
    assert_eq!(with_value(1.0 - tol)[max_event], 0.0);
    assert!(with_value(tol).iter().all(|v| *v >= 0.0));
    assert!(with_value(1.0 - tol).iter().all(|v| *v >= 0.0));
}

#[test]
fn test_solve_starting_on_tolerance_boundary_runs() {
    // Initial negative concentration at the upper bound, and no current
    let config = config()
        .with_parameter("Current function", 0.0)
        .with_parameter("Initial concentration in negative electrode", 1.0 - 1e-4);
    let mut sim = Simulation::new(half_cell_discharge().unwrap(), config);
    let solution = sim.solve().unwrap();
    assert_eq!(solution.termination, Termination::FinalTime);
}

#[test]
fn test_zero_electrochemistry_gives_zero_heating() {
    for option in [ThermalOption::Lumped, ThermalOption::XFull] {
        let model = ModelBuilder::new("thermal")
            .with_submodel(Thermal::new(LithiumIonParameters::new(), option))
            .with_submodel(zero_electrochemistry())
            .build()
            .unwrap();
        let mut sim = Simulation::new(model, config());
        let solution = sim.solve().unwrap();
        assert_eq!(solution.termination, Termination::FinalTime);

        let model = sim.discretised().unwrap();
        for name in [
            "Ohmic heating",
            "Irreversible electrochemical heating",
            "Reversible heating",
            "Total heating",
            "X-averaged total heating",
            "Volume-averaged total heating",
        ] {
            let heating = model.process_variable(name).unwrap();
            for values in solution.evaluate(&heating) {
                assert!(values.iter().all(|q| q.abs() < 1e-12), "{} is not zero", name);
            }
        }
        let temperature = model.process_variable("Volume-averaged cell temperature").unwrap();
        let last = solution.evaluate(&temperature).pop().unwrap();
        assert!(last[0].abs() < 1e-12);
    }
}

#[test]
fn test_total_heating_balances_sources_under_load() {
    let evaluate = |option: ThermalOption, dudt: f64| {
        let model = ModelBuilder::new("thermal")
            .with_submodel(Thermal::new(LithiumIonParameters::new(), option))
            .with_submodel(uniform_electrochemistry(2.0, 0.5, dudt))
            .build()
            .unwrap();
        let mut sim = Simulation::new(model, config());
        let model = sim.build().unwrap();
        let value = |name: &str| {
            model.process_variable(name).unwrap().evaluate(0.0, model.y0())
        };
        let sources = ["Ohmic heating", "Irreversible electrochemical heating", "Reversible heating"];
        let [q_ohm, q_rxn, q_rev] = sources.map(value);
        (value("Total heating"), q_ohm, q_rxn, q_rev)
    };

    for option in [ThermalOption::Lumped, ThermalOption::XFull] {
        for dudt in [0.1, -0.1] {
            let (q, q_ohm, q_rxn, q_rev) = evaluate(option, dudt);
            assert_eq!(q.len(), q_rev.len());
            for i in 0..q.len() {
                let sum = q_ohm[i] + q_rxn[i] + q_rev[i];
                assert!((q[i] - sum).abs() < 1e-10 * (1.0 + sum.abs()), "{} != {}", q[i], sum);
            }
            assert!(q_rxn.iter().any(|h| (h - 1.0).abs() < 1e-12));
            // Reversible heating takes the sign of the entropic change in the electrodes
            assert!(q_rev.iter().any(|h| *h != 0.0));
            assert!(q_rev.iter().all(|h| *h == 0.0 || h.signum() == dudt.signum()));
        }
    }
}

#[test]
fn test_through_cell_concatenation_must_be_ordered() {
    let on = |d: Domain| Domains::new(vec![d]).with_secondary(vec![Domain::CurrentCollector]);
    let c_n = Expr::from(Variable::new("c_n", on(Domain::NegativeElectrode)));
    let c_s = Expr::from(Variable::new("c_s", on(Domain::Separator)));
    let c_p = Expr::from(Variable::new("c_p", on(Domain::PositiveElectrode)));

    assert!(concatenation(vec![c_n.clone(), c_s.clone(), c_p.clone()]).is_ok());
    let err = concatenation(vec![c_s, c_n.clone()]).unwrap_err();
    assert!(matches!(err, ModelError::Domain(_)));
    assert!(concatenation(vec![c_n, c_p]).is_err());
}

#[test]
fn test_missing_parameter_is_reported() {
    let mut config = config();
    config.parameters.shift_remove("Electrolyte source coefficient");
    let mut sim = Simulation::new(half_cell_discharge().unwrap(), config);
    let err = sim.build().unwrap_err();
    assert!(matches!(err, ModelError::Parameter(_)));
}

#[test]
fn test_work_precision_sweep() {
    let rtols = [1e-3, 1e-5];
    let points = work_precision(half_cell_discharge, &config(), &rtols).unwrap();
    assert_eq!(points.len(), 2);
    for (point, rtol) in points.iter().zip(rtols) {
        assert_eq!(point.rtol, rtol);
        assert!(matches!(point.termination, Termination::Event(_)));
        assert!(point.steps > 0);
    }
    assert!((points[0].final_time - points[1].final_time).abs() < 1e-6);
}
