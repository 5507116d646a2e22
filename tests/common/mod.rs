#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bolt_downlinks::delivery::{DeliverySettings, Downlink, RetryPolicy};
use bolt_downlinks::device::DeviceIdentifier;
use bolt_downlinks::error::GatewayError;
use bolt_downlinks::gateway::{
    ApplicationInfo, DeliveryStatus, DeviceInfo, EnqueueRequest, Gateway, QueueItem,
};
use bolt_downlinks::lookup::{LookupTables, SteamTable, ThresholdTable};
use bolt_downlinks::protocol::EncodedPayload;
use bolt_downlinks::steamtrap::ParameterRecord;
use bolt_downlinks::store::{DownlinkStore, DuplicatePolicy};

pub const PT_TABLE: &str = "\
p-bar,t-celsius
1.0,99.6
2.0,120.2
3.0,133.5
4.0,143.6
5.0,151.8
";

pub const CONF_TABLE: &str = "\
Steam Trap Type,Mounting Type,Hardware Model,Condensate Load,P-Min [bar],P-Max [bar],TV,LV,SLTh0,SLVal0,SLTh1,SLVal1,SLTh2,SLVal2
BK,ADP,,,0.5,10,20,10,30,5,40,10,50,20
MK,ADP,,,0.5,10,22,11,31,6,41,11,51,21
UNA,PBS,,,0.5,10,18,9,28,4,38,8,48,16
";

pub const BK_DEVICE: &str = "A0B1C2D3E4F500FE";
pub const MK_DEVICE: &str = "A0B1C2D3E4F50100";
pub const UNA_DEVICE: &str = "A0B1C2D3E4F500FF";

pub fn tables() -> LookupTables {
    LookupTables::new(
        SteamTable::from_reader(PT_TABLE.as_bytes()).unwrap(),
        ThresholdTable::from_reader(CONF_TABLE.as_bytes()).unwrap(),
    )
}

pub fn id(raw: &str) -> DeviceIdentifier {
    raw.parse().unwrap()
}

pub fn bk_record(row: usize, deveui: &str, sst: &str) -> ParameterRecord {
    ParameterRecord {
        row,
        deveui: Some(deveui.into()),
        stt: Some("BK".into()),
        dmt: Some("1".into()),
        sst: Some(sst.into()),
        ..Default::default()
    }
}

pub fn una_record(row: usize, deveui: &str, dn: &str, dp: &str) -> ParameterRecord {
    ParameterRecord {
        row,
        deveui: Some(deveui.into()),
        stt: Some("UNA".into()),
        dmt: Some("PBS".into()),
        dn: Some(dn.into()),
        dp: Some(dp.into()),
        ..Default::default()
    }
}

/// A store holding a short two-fragment downlink for each device.
pub fn store(devices: &[&str], confirmed: bool) -> Arc<DownlinkStore> {
    let store = DownlinkStore::new(DuplicatePolicy::Reject);
    for deveui in devices {
        let payload = EncodedPayload::new(10, [vec![0x01, 0x00, 0x00, 0x95], vec![0x0a, 0x50]]);
        store.insert(Downlink::new(id(deveui), payload, confirmed)).unwrap();
    }
    Arc::new(store)
}

pub fn settings() -> DeliverySettings {
    DeliverySettings {
        workers: 4,
        max_polls: 3,
        poll_interval: Duration::from_secs(149),
        retry: RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        },
        ..Default::default()
    }
}

pub fn unavailable() -> GatewayError {
    GatewayError::Protocol {
        status: 503,
        body: "busy".into(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub authenticate: usize,

    pub list_devices: usize,

    pub list_applications: usize,

    pub get_queue: usize,

    pub flush_queue: usize,

    pub enqueue: usize,

    pub status: usize,
}

#[derive(Debug, Default)]
struct State {
    calls: Calls,

    login_failures: VecDeque<GatewayError>,

    enqueue_failures: HashMap<DeviceIdentifier, VecDeque<GatewayError>>,

    flush_failures: HashMap<DeviceIdentifier, VecDeque<GatewayError>>,

    /// Polls before acknowledging; `None` never acknowledges.
    ack_after: HashMap<DeviceIdentifier, Option<u32>>,

    polls: HashMap<DeviceIdentifier, u32>,

    queues: HashMap<DeviceIdentifier, Vec<QueueItem>>,

    sticky: HashSet<DeviceIdentifier>,

    enqueued: Vec<EnqueueRequest>,
}

/// In-memory gateway that follows a script of failures and acknowledgements.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    state: Mutex<State>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_login(&self, err: GatewayError) {
        self.state().login_failures.push_back(err);
    }

    pub fn fail_enqueue(&self, deveui: &str, errors: impl IntoIterator<Item = GatewayError>) {
        self.state()
            .enqueue_failures
            .entry(id(deveui))
            .or_default()
            .extend(errors);
    }

    pub fn fail_flush(&self, deveui: &str, errors: impl IntoIterator<Item = GatewayError>) {
        self.state()
            .flush_failures
            .entry(id(deveui))
            .or_default()
            .extend(errors);
    }

    pub fn ack_after(&self, deveui: &str, polls: Option<u32>) {
        self.state().ack_after.insert(id(deveui), polls);
    }

    /// Leaves items behind that no flush removes.
    pub fn stale_queue(&self, deveui: &str, items: usize) {
        let mut state = self.state();
        let deveui = id(deveui);
        state.sticky.insert(deveui);
        state.queues.entry(deveui).or_default().extend((0..items).map(|i| QueueItem {
            fport: Some(10),
            confirmed: Some(true),
            data: Some("AQAAlQ==".into()),
            reference: Some(format!("stale-{i}")),
            properties: Default::default(),
        }));
    }

    pub fn calls(&self) -> Calls {
        self.state().calls
    }

    pub fn enqueued(&self) -> Vec<EnqueueRequest> {
        self.state().enqueued.clone()
    }

    pub fn enqueued_for(&self, deveui: &str) -> Vec<EnqueueRequest> {
        let deveui = id(deveui);
        self.state()
            .enqueued
            .iter()
            .filter(|r| r.dev_eui == deveui)
            .cloned()
            .collect()
    }

    pub fn queue_len(&self, deveui: &str) -> usize {
        self.state().queues.get(&id(deveui)).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.authenticate += 1;
        match state.login_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, GatewayError> {
        let mut state = self.state();
        state.calls.list_devices += 1;
        let mut devices: Vec<_> = state
            .queues
            .keys()
            .map(|id| DeviceInfo {
                dev_eui: id.to_string(),
                name: Some(format!("bolt-{id}")),
                properties: Default::default(),
            })
            .collect();
        devices.sort_by(|a, b| a.dev_eui.cmp(&b.dev_eui));
        Ok(devices)
    }

    async fn list_applications(&self) -> Result<Vec<ApplicationInfo>, GatewayError> {
        self.state().calls.list_applications += 1;
        Ok(vec![ApplicationInfo {
            id: Some("1".into()),
            name: Some("bolt".into()),
            properties: Default::default(),
        }])
    }

    async fn get_queue(&self, deveui: &DeviceIdentifier) -> Result<Vec<QueueItem>, GatewayError> {
        let mut state = self.state();
        state.calls.get_queue += 1;
        Ok(state.queues.get(deveui).cloned().unwrap_or_default())
    }

    async fn flush_queue(&self, deveui: &DeviceIdentifier) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.flush_queue += 1;
        if let Some(err) = state
            .flush_failures
            .get_mut(deveui)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        if !state.sticky.contains(deveui) {
            state.queues.remove(deveui);
        }
        Ok(())
    }

    async fn enqueue_downlink(
        &self,
        deveui: &DeviceIdentifier,
        request: &EnqueueRequest,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.calls.enqueue += 1;
        if let Some(err) = state
            .enqueue_failures
            .get_mut(deveui)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        state.queues.entry(*deveui).or_default().push(QueueItem {
            fport: Some(request.fport),
            confirmed: Some(request.confirmed),
            data: Some(request.data.clone()),
            reference: Some(request.reference.clone()),
            properties: Default::default(),
        });
        state.enqueued.push(request.clone());
        Ok(())
    }

    async fn get_delivery_status(
        &self,
        deveui: &DeviceIdentifier,
    ) -> Result<DeliveryStatus, GatewayError> {
        let mut state = self.state();
        state.calls.status += 1;
        let polls = {
            let polls = state.polls.entry(*deveui).or_default();
            *polls += 1;
            *polls
        };

        let ready = match state.ack_after.get(deveui).copied().unwrap_or(Some(1)) {
            Some(after) => polls >= after,
            None => false,
        };
        if !ready {
            return Ok(DeliveryStatus::default());
        }

        Ok(DeliveryStatus {
            acknowledged: state
                .enqueued
                .iter()
                .filter(|r| &r.dev_eui == deveui)
                .map(|r| r.reference.clone())
                .collect(),
        })
    }
}
