use crate::domoticz::TelemetrySink;
use crate::error::{PollError, TransportError};
use crate::frame_decoder::{decode, FieldDescriptor, Readings, MIN_FRAME_LEN};
use crate::inverter_client::InverterTransport;
use crate::inverter_id::hex_dump;
use crate::publisher::Publisher;
use crate::sleeper::Sleeper;
use crate::telemetry_store::TelemetryStore;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Poll settings that do not change while running.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_failures: u32,
    pub temperature_max: f64,
}

/// State carried from one cycle to the next.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PollState {
    pub consecutive_failures: u32,
    pub last_sent_frame: Option<Vec<u8>>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Decoded,
    Failed(PollError),
}

/// What one cycle did, for the host loop and for tests.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub consecutive_failures: u32,
    /// The store was zeroed during this cycle.
    pub degraded: bool,
    /// Number of sink updates that succeeded, `None` when nothing was published.
    pub published: Option<usize>,
}

/// Polls one inverter and forwards its readings, zeroing them once it looks offline.
pub struct InverterReader<T, S, P> {
    transport: T,
    sink: S,
    sleeper: P,
    publisher: Publisher,
    mapping: &'static [FieldDescriptor],
    identification: Vec<u8>,
    settings: PollSettings,
    store: TelemetryStore,
    state: PollState,
}

impl<T, S, P> InverterReader<T, S, P>
where
    T: InverterTransport,
    S: TelemetrySink,
    P: Sleeper,
{
    /// `store` must come out of the energy bootstrap so the lifetime energy is already known.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: T,
        sink: S,
        sleeper: P,
        publisher: Publisher,
        mapping: &'static [FieldDescriptor],
        identification: Vec<u8>,
        settings: PollSettings,
        store: TelemetryStore,
    ) -> Self {
        Self {
            transport,
            sink,
            sleeper,
            publisher,
            mapping,
            identification,
            settings,
            store,
            state: PollState::default(),
        }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Runs cycles back to back, separated by the poll interval, forever.
    pub async fn run(&mut self) {
        info!(
            "Starting inverter reader, polling every {:?}, offline after {} failures",
            self.settings.interval, self.settings.max_failures
        );
        loop {
            self.poll_once().await;
            self.sleeper.sleep(self.settings.interval).await;
        }
    }

    /// One connect, send, receive, decode and publish pass.
    pub async fn poll_once(&mut self) -> CycleReport {
        match self.fetch().await {
            Ok(readings) => {
                self.store.apply(readings);
                self.state.consecutive_failures = 0;
                let published = self.publisher.publish(&self.store, &self.sink).await;
                CycleReport {
                    outcome: CycleOutcome::Decoded,
                    consecutive_failures: 0,
                    degraded: false,
                    published: Some(published),
                }
            }
            Err(e) => self.handle_failure(e).await,
        }
    }

    async fn fetch(&mut self) -> Result<Readings, PollError> {
        self.state.last_sent_frame = Some(self.identification.clone());
        let frame = match self.transport.exchange(&self.identification).await {
            Ok(frame) => frame,
            // A read that times out is an empty answer, not a broken connection
            Err(TransportError::ReceiveTimeout) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Received {}", hex_dump(&frame));

        if frame.len() < MIN_FRAME_LEN {
            // Polling too often yields "no inverter data"; waiting longer clears it
            self.sleeper.sleep(self.settings.interval).await;
            return Err(PollError::ShortFrame {
                received: frame.len(),
            });
        }

        Ok(decode(
            &frame,
            self.mapping,
            self.settings.temperature_max,
        )?)
    }

    async fn handle_failure(&mut self, e: PollError) -> CycleReport {
        match &e {
            PollError::Decode(_) => error!("{}", e),
            _ => warn!("{}", e),
        }

        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        let failures = self.state.consecutive_failures;
        let threshold = self.settings.max_failures;

        let degraded = failures == threshold;
        if degraded {
            info!("{} consecutive failures, assuming the inverter is offline", failures);
            self.store.degrade(self.mapping);
        }

        let published = if failures >= threshold {
            Some(self.publisher.publish(&self.store, &self.sink).await)
        } else {
            None
        };

        CycleReport {
            outcome: CycleOutcome::Failed(e),
            consecutive_failures: failures,
            degraded,
            published,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorIds;
    use crate::error::DecodeError;
    use crate::frame_decoder::{
        FieldWidth, AC_POWER, AC_VOLTAGE, DC_VOLTAGE, INVERTER_FIELDS, LIFETIME_ENERGY,
        TEMPERATURE,
    };
    use crate::inverter_id::identification_frame;
    use crate::publisher::tests::RecordingSink;
    use crate::sleeper::tests::RecordingSleeper;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_secs(15);

    enum Scripted {
        Frame(Vec<u8>),
        Refused,
        TimedOut,
    }

    /// Plays back a scripted sequence of responses and records every request.
    struct ScriptedTransport {
        script: VecDeque<Scripted>,
        requests: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn with(script: Vec<Scripted>) -> Self {
            Self {
                script: script.into(),
                requests: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl InverterTransport for ScriptedTransport {
        async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.requests.push(request.to_vec());
            match self.script.pop_front() {
                Some(Scripted::Frame(frame)) => Ok(frame),
                Some(Scripted::TimedOut) => Err(TransportError::ReceiveTimeout),
                Some(Scripted::Refused) | None => Err(TransportError::Connect {
                    endpoint: "inverter:8899".to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                }),
            }
        }
    }

    /// temperature 41.0, vpv1 300.0, vac1 230.0, pac1 800 W, etotal 1240.0 kWh
    fn live_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 99];
        frame[31..33].copy_from_slice(&410u16.to_be_bytes());
        frame[33..35].copy_from_slice(&3000u16.to_be_bytes());
        frame[51..53].copy_from_slice(&2300u16.to_be_bytes());
        frame[59..61].copy_from_slice(&800u16.to_be_bytes());
        frame[71..75].copy_from_slice(&12400u32.to_be_bytes());
        frame
    }

    type TestReader =
        InverterReader<ScriptedTransport, Arc<RecordingSink>, Arc<RecordingSleeper>>;

    fn reader(
        script: Vec<Scripted>,
        max_failures: u32,
    ) -> (TestReader, Arc<RecordingSink>, Arc<RecordingSleeper>) {
        reader_with_mapping(script, max_failures, &INVERTER_FIELDS)
    }

    fn reader_with_mapping(
        script: Vec<Scripted>,
        max_failures: u32,
        mapping: &'static [FieldDescriptor],
    ) -> (TestReader, Arc<RecordingSink>, Arc<RecordingSleeper>) {
        let sink = Arc::new(RecordingSink::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let reader = InverterReader::new(
            ScriptedTransport::with(script),
            sink.clone(),
            sleeper.clone(),
            Publisher::new(SensorIds::default()),
            mapping,
            identification_frame(12345678),
            PollSettings {
                interval: INTERVAL,
                max_failures,
                temperature_max: 200.0,
            },
            TelemetryStore::with_lifetime_energy(1234.5),
        );
        (reader, sink, sleeper)
    }

    fn assert_degraded(store: &TelemetryStore, etotal: f64) {
        for field in [TEMPERATURE, DC_VOLTAGE, AC_VOLTAGE, AC_POWER] {
            assert_eq!(store.get(field), Some(0.0), "{field}");
        }
        assert_eq!(store.get(LIFETIME_ENERGY), Some(etotal));
    }

    #[tokio::test]
    async fn test_decoded_cycle_publishes_live_values() {
        let (mut reader, sink, _) = reader(vec![Scripted::Frame(live_frame())], 2);

        let report = reader.poll_once().await;

        assert!(matches!(report.outcome, CycleOutcome::Decoded));
        assert_eq!(report.consecutive_failures, 0);
        assert_eq!(report.published, Some(4));
        assert_eq!(reader.store().get(AC_VOLTAGE), Some(230.0));
        assert_eq!(reader.store().lifetime_energy(), 1240.0);
        assert_eq!(
            sink.take_updates(),
            vec![
                (16, "41".to_string()),
                (15, "300".to_string()),
                (14, "230".to_string()),
                (13, "800;1240000".to_string()),
            ]
        );
        assert_eq!(reader.transport.requests, vec![identification_frame(12345678)]);
        assert_eq!(
            reader.state().last_sent_frame,
            Some(identification_frame(12345678))
        );
    }

    #[tokio::test]
    async fn test_two_transport_errors_degrade_at_threshold_two() {
        let (mut reader, sink, _) = reader(vec![Scripted::Refused, Scripted::Refused], 2);

        let first = reader.poll_once().await;
        assert!(matches!(
            first.outcome,
            CycleOutcome::Failed(PollError::Transport(_))
        ));
        assert_eq!(first.consecutive_failures, 1);
        assert!(!first.degraded);
        assert_eq!(first.published, None);
        assert!(sink.take_updates().is_empty());

        let second = reader.poll_once().await;
        assert_eq!(second.consecutive_failures, 2);
        assert!(second.degraded);
        assert_eq!(second.published, Some(4));
        assert_degraded(reader.store(), 1234.5);
        assert_eq!(
            sink.take_updates(),
            vec![
                (16, "0".to_string()),
                (15, "0".to_string()),
                (14, "0".to_string()),
                (13, "0;1234500".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_degrade_is_edge_triggered_but_republishes() {
        let (mut reader, sink, _) = reader(
            vec![
                Scripted::Frame(live_frame()),
                Scripted::Refused,
                Scripted::Refused,
                Scripted::Refused,
            ],
            2,
        );

        reader.poll_once().await;
        sink.take_updates();

        reader.poll_once().await;
        let degrading = reader.poll_once().await;
        assert!(degrading.degraded);
        assert_degraded(reader.store(), 1240.0);
        sink.take_updates();

        let after = reader.poll_once().await;
        assert_eq!(after.consecutive_failures, 3);
        assert!(!after.degraded);
        assert_eq!(after.published, Some(4));
        assert_degraded(reader.store(), 1240.0);
        assert_eq!(sink.take_updates()[3], (13, "0;1240000".to_string()));
    }

    #[tokio::test]
    async fn test_recovery_after_degrade_resets_counter() {
        let (mut reader, sink, _) = reader(
            vec![
                Scripted::Refused,
                Scripted::Refused,
                Scripted::Frame(live_frame()),
            ],
            2,
        );

        reader.poll_once().await;
        reader.poll_once().await;
        assert_degraded(reader.store(), 1234.5);
        sink.take_updates();

        let report = reader.poll_once().await;

        assert!(matches!(report.outcome, CycleOutcome::Decoded));
        assert_eq!(reader.state().consecutive_failures, 0);
        assert_eq!(reader.store().get(AC_VOLTAGE), Some(230.0));
        let updates = sink.take_updates();
        assert_eq!(updates[2], (14, "230".to_string()));
        assert_eq!(updates[3], (13, "800;1240000".to_string()));
    }

    #[tokio::test]
    async fn test_short_frame_fails_and_waits_an_extra_interval() {
        let (mut reader, _, sleeper) = reader(vec![Scripted::Frame(vec![0u8; 90])], 2);

        let report = reader.poll_once().await;

        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed(PollError::ShortFrame { received: 90 })
        ));
        assert_eq!(report.consecutive_failures, 1);
        assert_eq!(sleeper.take(), vec![INTERVAL]);
    }

    #[tokio::test]
    async fn test_91_byte_frame_is_accepted() {
        let mut frame = live_frame();
        frame.truncate(91);
        let (mut reader, _, sleeper) = reader(vec![Scripted::Frame(frame)], 2);

        let report = reader.poll_once().await;

        assert!(matches!(report.outcome, CycleOutcome::Decoded));
        assert!(sleeper.take().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_of_one_degrades_on_first_failure() {
        let (mut reader, _, _) = reader(vec![Scripted::Refused], 1);

        let report = reader.poll_once().await;

        assert!(report.degraded);
        assert_eq!(report.published, Some(4));
        // Nothing was ever decoded, only the seeded energy exists and the others are zero now
        assert_eq!(reader.store().get(AC_POWER), Some(0.0));
        assert_eq!(reader.store().lifetime_energy(), 1234.5);
    }

    #[tokio::test]
    async fn test_read_timeout_waits_an_extra_interval() {
        let (mut reader, _, sleeper) = reader(vec![Scripted::TimedOut], 2);

        let report = reader.poll_once().await;

        assert!(matches!(
            report.outcome,
            CycleOutcome::Failed(PollError::ShortFrame { received: 0 })
        ));
        assert_eq!(report.consecutive_failures, 1);
        assert_eq!(sleeper.take(), vec![INTERVAL]);
    }

    #[tokio::test]
    async fn test_connection_failure_skips_the_extra_interval() {
        let (mut reader, _, sleeper) = reader(vec![Scripted::Refused], 2);

        reader.poll_once().await;

        assert!(sleeper.take().is_empty());
        assert_eq!(
            reader.state().last_sent_frame,
            Some(identification_frame(12345678))
        );
    }

    static OUT_OF_RANGE_FIELDS: [FieldDescriptor; 1] =
        [FieldDescriptor::new("far", 120, FieldWidth::Long, 1.0)];

    #[tokio::test]
    async fn test_decode_failure_counts_as_failure() {
        let (mut reader, sink, _) = reader_with_mapping(
            vec![Scripted::Frame(live_frame()), Scripted::Frame(live_frame())],
            2,
            &OUT_OF_RANGE_FIELDS,
        );

        let first = reader.poll_once().await;
        assert!(matches!(
            first.outcome,
            CycleOutcome::Failed(PollError::Decode(DecodeError::OutOfBounds { field: "far", .. }))
        ));
        assert_eq!(first.consecutive_failures, 1);
        assert!(!first.degraded);
        assert_eq!(reader.store().get("far"), None);
        assert_eq!(reader.store().get(AC_VOLTAGE), None);

        let second = reader.poll_once().await;
        assert_eq!(second.consecutive_failures, 2);
        assert!(second.degraded);
        assert_eq!(reader.store().get("far"), Some(0.0));
        assert_eq!(reader.store().get(AC_VOLTAGE), None);
        assert_eq!(reader.store().lifetime_energy(), 1234.5);
        // Only fields the publisher knows are sent, none of them were decoded
        assert!(sink.take_updates().is_empty());
    }
}
