use hosola_bridge::energy_bootstrap::load_lifetime_energy;
use hosola_bridge::frame_decoder::INVERTER_FIELDS;
use hosola_bridge::inverter_id::{hex_dump, identification_frame};
use hosola_bridge::{
    DomoticzAPI, InverterReader, PollSettings, Publisher, Settings, TcpInverterTransport,
    TokioSleeper,
};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(settings.verbosity.level_filter())
        .init();

    info!("Starting Hosola inverter bridge");

    let identification = identification_frame(settings.inverter.serial);
    debug!("Created identifier: {}", hex_dump(&identification));

    let domoticz = DomoticzAPI::new(&settings.domoticz);

    // The lifetime energy must be known before anything can be zeroed downstream
    let store = load_lifetime_energy(
        &domoticz,
        settings.sensors.energy,
        &TokioSleeper,
        settings.poll_interval,
    )
    .await;

    let transport = TcpInverterTransport::new(
        &settings.inverter.host,
        settings.inverter.port,
        settings.inverter.timeout,
    );
    info!("Polling inverter at {}", transport.endpoint());

    let mut reader = InverterReader::new(
        transport,
        domoticz,
        TokioSleeper,
        Publisher::new(settings.sensors),
        &INVERTER_FIELDS,
        identification,
        PollSettings {
            interval: settings.poll_interval,
            max_failures: settings.max_failures,
            temperature_max: settings.temperature_max,
        },
        store,
    );
    reader.run().await;

    Ok(())
}
