//! Settings graph behavior against the simulated SDK: dependency cascade,
//! discovery probes, mandatory-field checks, and the full apply pass.

use camdaq_core::capabilities::{
    AcquisitionMode, AmplifierInfo, AmplifierKind, Feature, ReadoutMode, TriggerMode,
};
use camdaq_core::error::CamError;
use camdaq_core::sdk::CameraSdk;
use camdaq_ctrl::settings::SettingsGraph;
use camdaq_mock::MockSdk;
use std::sync::Arc;

fn graph_with(sdk: Arc<MockSdk>) -> SettingsGraph {
    SettingsGraph::new(sdk)
}

#[tokio::test]
async fn ad_converter_change_clears_hs_speed_and_preamp_gain() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph.set_ad_converter(0).await.unwrap();
    graph.set_output_amplifier(0).await.unwrap();
    graph.set_hs_speed(0).await.unwrap();
    graph.set_preamp_gain(0).await.unwrap();
    assert!(graph.snapshot().hs_speed.is_some());
    assert!(graph.snapshot().preamp_gain.is_some());

    graph.set_ad_converter(1).await.unwrap();
    assert!(graph.snapshot().hs_speed.is_none());
    assert!(graph.snapshot().preamp_gain.is_none());
}

#[tokio::test]
async fn amplifier_change_clears_downstream_including_em_gain() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph.set_ad_converter(0).await.unwrap();
    graph.set_output_amplifier(0).await.unwrap();
    graph.set_hs_speed(0).await.unwrap();
    graph.set_preamp_gain(0).await.unwrap();
    graph.set_em_gain(50).await.unwrap();

    graph.set_output_amplifier(1).await.unwrap();
    assert!(graph.snapshot().hs_speed.is_none());
    assert!(graph.snapshot().preamp_gain.is_none());
    assert!(graph.snapshot().em_gain.is_none());
}

#[tokio::test]
async fn hs_speed_change_clears_only_preamp_gain() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph.set_ad_converter(0).await.unwrap();
    graph.set_output_amplifier(0).await.unwrap();
    graph.set_hs_speed(0).await.unwrap();
    graph.set_preamp_gain(0).await.unwrap();
    graph.set_em_gain(50).await.unwrap();

    graph.set_hs_speed(1).await.unwrap();
    assert!(graph.snapshot().preamp_gain.is_none());
    assert_eq!(graph.snapshot().em_gain, Some(50));
}

#[tokio::test]
async fn hs_speed_probe_is_idempotent() {
    let sdk = Arc::new(MockSdk::builder().build());
    let graph = graph_with(sdk);

    let first = graph.available_hs_speeds(0, 0).await.unwrap();
    let second = graph.available_hs_speeds(0, 0).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert!((first[0].speed_mhz - 30.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn hs_speed_support_probe_answers_without_mutation() {
    let sdk = Arc::new(MockSdk::builder().build());
    let graph = graph_with(sdk);

    assert!(graph.is_hs_speed_supported(0, 0, 2).await.unwrap());
    assert!(!graph.is_hs_speed_supported(0, 0, 3).await.unwrap());
    assert!(graph.snapshot().hs_speed.is_none());
}

#[tokio::test]
async fn rejected_setter_leaves_snapshot_unchanged() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph.set_ad_converter(0).await.unwrap();
    let before = graph.snapshot().clone();
    let err = graph.set_ad_converter(9).await.unwrap_err();
    assert!(matches!(err, CamError::Configuration(_)));
    assert_eq!(graph.snapshot(), &before);
}

#[tokio::test]
async fn hs_speed_requires_converter_and_amplifier() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    let err = graph.set_hs_speed(0).await.unwrap_err();
    assert!(matches!(err, CamError::MissingSetting("AD converter")));

    graph.set_ad_converter(0).await.unwrap();
    let err = graph.set_hs_speed(0).await.unwrap_err();
    assert!(matches!(err, CamError::MissingSetting("output amplifier")));
}

#[tokio::test]
async fn unsupported_feature_is_reported_not_validated() {
    let sdk = Arc::new(MockSdk::builder().without_settable(Feature::EmGain).build());
    let mut graph = graph_with(sdk);

    graph.set_ad_converter(0).await.unwrap();
    graph.set_output_amplifier(0).await.unwrap();
    let err = graph.set_em_gain(50).await.unwrap_err();
    assert!(matches!(err, CamError::UnsupportedOperation(_)));
}

#[tokio::test]
async fn em_gain_needs_em_amplifier_selected() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph.set_output_amplifier(1).await.unwrap();
    let err = graph.set_em_gain(50).await.unwrap_err();
    assert!(matches!(err, CamError::Configuration(_)));
}

#[tokio::test]
async fn unavailable_gain_combination_yields_empty_list_not_error() {
    let sdk = Arc::new(
        MockSdk::builder()
            .unavailable_gain(0, 1, 0, 0)
            .unavailable_gain(0, 1, 0, 1)
            .unavailable_gain(0, 1, 0, 2)
            .build(),
    );
    let graph = graph_with(sdk);

    let gains = graph.available_preamp_gains(0, 1, 0).await.unwrap();
    assert!(gains.is_empty());

    // A different speed index is unaffected.
    let gains = graph.available_preamp_gains(0, 1, 1).await.unwrap();
    assert_eq!(gains.len(), 3);
}

#[tokio::test]
async fn em_gain_range_probe_restores_prior_amplifier() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = SettingsGraph::new(sdk.clone());

    graph.set_output_amplifier(1).await.unwrap();
    let range = graph.em_gain_range().await.unwrap();
    assert_eq!(range, (1, 300));

    // The device saw the EM stage selected for the probe, then the prior
    // conventional selection written back.
    let history = sdk.amplifier_history();
    assert_eq!(history, vec![0, 1]);
    assert_eq!(graph.snapshot().output_amplifier.as_ref().map(|a| a.index), Some(1));
}

#[tokio::test]
async fn em_gain_range_probe_restores_default_when_nothing_selected() {
    let sdk = Arc::new(
        MockSdk::builder()
            .amplifiers(vec![
                AmplifierInfo {
                    index: 0,
                    name: "Conventional".into(),
                    kind: AmplifierKind::Conventional,
                    max_speed_mhz: 3.0,
                },
                AmplifierInfo {
                    index: 1,
                    name: "Electron Multiplying".into(),
                    kind: AmplifierKind::ElectronMultiplying,
                    max_speed_mhz: 30.0,
                },
            ])
            .build(),
    );
    let mut graph = SettingsGraph::new(sdk.clone());

    let range = graph.em_gain_range().await.unwrap();
    assert_eq!(range, (1, 300));

    // With no prior selection the device is put back on the power-on
    // amplifier, not left on the EM stage.
    assert_eq!(sdk.amplifier_history(), vec![1, 0]);
    assert_eq!(sdk.selected_amplifier(), Some(0));
    assert!(graph.snapshot().output_amplifier.is_none());
}

#[tokio::test]
async fn apply_rejects_missing_mandatory_settings() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    let err = graph.apply().await.unwrap_err();
    assert!(matches!(err, CamError::MissingSetting("acquisition mode")));

    graph
        .set_acquisition_mode(AcquisitionMode::SingleScan)
        .await
        .unwrap();
    graph.set_readout_mode(ReadoutMode::FullImage).await.unwrap();
    graph.set_trigger_mode(TriggerMode::Internal).await.unwrap();
    let err = graph.apply().await.unwrap_err();
    assert!(matches!(err, CamError::MissingSetting("exposure time")));
}

#[tokio::test]
async fn apply_enforces_mode_cycle_requirements() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph
        .set_acquisition_mode(AcquisitionMode::Kinetic)
        .await
        .unwrap();
    graph.set_readout_mode(ReadoutMode::FullImage).await.unwrap();
    graph.set_trigger_mode(TriggerMode::Internal).await.unwrap();
    graph.set_exposure_time(0.1).await.unwrap();

    let err = graph.apply().await.unwrap_err();
    assert!(matches!(err, CamError::MissingSetting("accumulate cycle")));

    graph.set_accumulate_cycle(1, 0.0).await.unwrap();
    let err = graph.apply().await.unwrap_err();
    assert!(matches!(err, CamError::MissingSetting("kinetic cycle")));

    graph.set_kinetic_cycle(3, 0.1).await.unwrap();
    assert!(graph.apply().await.is_ok());
}

#[tokio::test]
async fn full_configuration_applies_with_all_success_report() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = graph_with(sdk);

    graph.set_ad_converter(1).await.unwrap();
    graph.set_output_amplifier(0).await.unwrap();
    graph.set_hs_speed(0).await.unwrap();
    graph.set_preamp_gain(0).await.unwrap();
    graph
        .set_acquisition_mode(AcquisitionMode::SingleScan)
        .await
        .unwrap();
    graph.set_readout_mode(ReadoutMode::FullImage).await.unwrap();
    graph.set_trigger_mode(TriggerMode::Internal).await.unwrap();
    graph.set_exposure_time(0.5).await.unwrap();

    let report = graph.apply().await.unwrap();
    assert!(report.all_ok(), "failures: {:?}", report.failures().count());
    assert!((report.timings.exposure_s - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn apply_is_refused_while_device_is_acquiring() {
    let sdk = Arc::new(MockSdk::builder().build());
    let mut graph = SettingsGraph::new(sdk.clone());

    graph
        .set_acquisition_mode(AcquisitionMode::RunTillAbort)
        .await
        .unwrap();
    graph.set_readout_mode(ReadoutMode::FullImage).await.unwrap();
    graph.set_trigger_mode(TriggerMode::Internal).await.unwrap();
    graph.set_exposure_time(0.05).await.unwrap();
    graph.set_kinetic_cycle(1, 0.0).await.unwrap();
    assert!(graph.apply().await.unwrap().all_ok());

    sdk.start_acquisition().await.unwrap();

    // Snapshot edits stay local while a session runs.
    graph.set_exposure_time(9.0).await.unwrap();
    let err = graph.apply().await.unwrap_err();
    assert!(matches!(err, CamError::AcquisitionInProgress));

    // The device-touching probe is refused for the same reason.
    let err = graph.em_gain_range().await.unwrap_err();
    assert!(matches!(err, CamError::AcquisitionInProgress));

    sdk.abort_acquisition().await.unwrap();

    // Between sessions the deferred edit goes through.
    let report = graph.apply().await.unwrap();
    assert!(report.all_ok());
    assert!((report.timings.exposure_s - 9.0).abs() < 1e-9);
}

#[tokio::test]
async fn apply_continues_past_a_rejected_parameter() {
    let sdk = Arc::new(
        MockSdk::builder()
            .fail_on(camdaq_mock::FailPoint::SetExposure)
            .build(),
    );
    let mut graph = graph_with(sdk);

    graph
        .set_acquisition_mode(AcquisitionMode::SingleScan)
        .await
        .unwrap();
    graph.set_readout_mode(ReadoutMode::FullImage).await.unwrap();
    graph.set_trigger_mode(TriggerMode::Internal).await.unwrap();
    graph.set_exposure_time(0.5).await.unwrap();

    let report = graph.apply().await.unwrap();
    assert!(!report.all_ok());
    let failed: Vec<_> = report.failures().map(|(f, _)| f.label()).collect();
    assert_eq!(failed, vec!["exposure time"]);
    // Other writes in the batch still succeeded.
    assert!(report.results.len() > 1);
}
