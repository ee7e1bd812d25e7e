//! Inverter slots, their command queues and the fixed-capacity fleet.

use core::fmt;

use heapless::Deque;

use crate::config::{InverterConfig, MAX_NUM_INVERTERS};

/// Queued info requests per inverter.
pub const COMMAND_QUEUE_DEPTH: usize = 8;

/// Seconds a record stays fresh enough to report "producing".
pub const INACTIVE_THRESHOLD_SECS: u32 = 300;

/// Information requests answered with a multi-fragment payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InfoCommand {
    DevInformSimple,
    DevInformAll,
    GridOnProfilePara,
    HardwareConfig,
    SystemConfigPara,
    RealTimeRunData,
    AlarmData,
    AlarmUpdate,
    RecordData,
    GetLossRate,
}

impl InfoCommand {
    /// Sub-command byte carried by the time packet.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            InfoCommand::DevInformSimple => 0,
            InfoCommand::DevInformAll => 1,
            InfoCommand::GridOnProfilePara => 2,
            InfoCommand::HardwareConfig => 3,
            InfoCommand::SystemConfigPara => 5,
            InfoCommand::RealTimeRunData => 11,
            InfoCommand::AlarmData => 17,
            InfoCommand::AlarmUpdate => 18,
            InfoCommand::RecordData => 19,
            InfoCommand::GetLossRate => 21,
        }
    }

    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        Some(match code {
            0 => InfoCommand::DevInformSimple,
            1 => InfoCommand::DevInformAll,
            2 => InfoCommand::GridOnProfilePara,
            3 => InfoCommand::HardwareConfig,
            5 => InfoCommand::SystemConfigPara,
            11 => InfoCommand::RealTimeRunData,
            17 => InfoCommand::AlarmData,
            18 => InfoCommand::AlarmUpdate,
            19 => InfoCommand::RecordData,
            21 => InfoCommand::GetLossRate,
            _ => return None,
        })
    }
}

impl fmt::Display for InfoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InfoCommand::DevInformSimple => "dev-inform-simple",
            InfoCommand::DevInformAll => "dev-inform-all",
            InfoCommand::GridOnProfilePara => "grid-profile",
            InfoCommand::HardwareConfig => "hardware-config",
            InfoCommand::SystemConfigPara => "system-config",
            InfoCommand::RealTimeRunData => "realtime",
            InfoCommand::AlarmData => "alarm-data",
            InfoCommand::AlarmUpdate => "alarm-update",
            InfoCommand::RecordData => "record-data",
            InfoCommand::GetLossRate => "loss-rate",
        };
        f.write_str(name)
    }
}

/// Device-control commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DevControlCmd {
    TurnOn,
    TurnOff,
    Restart,
    Lock,
    Unlock,
    ActivePowerLimit,
    CleanStateLockAndAlarm,
}

impl DevControlCmd {
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            DevControlCmd::TurnOn => 0,
            DevControlCmd::TurnOff => 1,
            DevControlCmd::Restart => 2,
            DevControlCmd::Lock => 3,
            DevControlCmd::Unlock => 4,
            DevControlCmd::ActivePowerLimit => 11,
            DevControlCmd::CleanStateLockAndAlarm => 20,
        }
    }
}

impl fmt::Display for DevControlCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DevControlCmd::TurnOn => "turn-on",
            DevControlCmd::TurnOff => "turn-off",
            DevControlCmd::Restart => "restart",
            DevControlCmd::Lock => "lock",
            DevControlCmd::Unlock => "unlock",
            DevControlCmd::ActivePowerLimit => "power-limit",
            DevControlCmd::CleanStateLockAndAlarm => "clean-state",
        };
        f.write_str(name)
    }
}

/// Last command put on air for a slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxCommand {
    Info(InfoCommand),
    Control(DevControlCmd),
}

impl fmt::Display for TxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxCommand::Info(cmd) => write!(f, "info {cmd}"),
            TxCommand::Control(cmd) => write!(f, "control {cmd}"),
        }
    }
}

/// Unit of a power limit value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LimitUnit {
    Watts,
    Percent,
}

/// Active power limit carried by a control packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerLimit {
    pub value: u16,
    pub unit: LimitUnit,
    pub persistent: bool,
}

impl PowerLimit {
    const RELATIVE_FLAG: u16 = 0x0001;
    const PERSISTENT_FLAG: u16 = 0x0100;

    #[must_use]
    pub const fn new(value: u16, unit: LimitUnit, persistent: bool) -> Self {
        Self {
            value,
            unit,
            persistent,
        }
    }

    /// Two-word wire payload: limit in tenths, then the unit/persistence flags.
    #[must_use]
    pub const fn payload(self) -> [u16; 2] {
        let mut flags = 0;
        if matches!(self.unit, LimitUnit::Percent) {
            flags |= Self::RELATIVE_FLAG;
        }
        if self.persistent {
            flags |= Self::PERSISTENT_FLAG;
        }
        [self.value.saturating_mul(10), flags]
    }
}

/// A device-control request waiting for the next poll of its slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ControlRequest {
    pub command: DevControlCmd,
    pub limit: PowerLimit,
}

impl ControlRequest {
    #[must_use]
    pub const fn new(command: DevControlCmd) -> Self {
        Self {
            command,
            limit: PowerLimit::new(0, LimitUnit::Watts, false),
        }
    }

    #[must_use]
    pub const fn power_limit(limit: PowerLimit) -> Self {
        Self {
            command: DevControlCmd::ActivePowerLimit,
            limit,
        }
    }
}

/// Five-byte radio address: `0x01` followed by the low four serial bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RadioAddress(pub [u8; 5]);

impl RadioAddress {
    #[must_use]
    pub const fn from_serial(serial: u64) -> Self {
        let bytes = serial.to_be_bytes();
        Self([0x01, bytes[4], bytes[5], bytes[6], bytes[7]])
    }
}

impl fmt::Display for RadioAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Most recent real-time record assembled for an inverter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ProductionRecord {
    pub timestamp: u32,
    /// AC output in tenths of a watt.
    pub ac_power_dw: u32,
}

impl ProductionRecord {
    /// Producing means non-zero AC output reported within the last five minutes.
    #[must_use]
    pub const fn is_producing(&self, now: u32) -> bool {
        self.ac_power_dw > 0
            && self.timestamp.saturating_add(INACTIVE_THRESHOLD_SECS) >= now
    }
}

/// State of the single in-flight request of a slot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RequestState {
    #[default]
    Idle,
    Sent(TxCommand),
}

/// One paired inverter.
#[derive(Clone, Debug)]
pub struct InverterSlot {
    pub config: InverterConfig,
    pub address: RadioAddress,
    queue: Deque<InfoCommand, COMMAND_QUEUE_DEPTH>,
    pending_control: Option<ControlRequest>,
    pub alarm_index: u16,
    pub request: RequestState,
    pub last_command: Option<TxCommand>,
    pub record: Option<ProductionRecord>,
}

impl InverterSlot {
    #[must_use]
    pub fn new(config: InverterConfig) -> Self {
        Self {
            config,
            address: RadioAddress::from_serial(config.serial),
            queue: Deque::new(),
            pending_control: None,
            alarm_index: 0,
            request: RequestState::Idle,
            last_command: None,
            record: None,
        }
    }

    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.config.serial
    }

    /// Head of the info queue, or the default real-time request when empty.
    #[must_use]
    pub fn next_command(&self) -> InfoCommand {
        self.queue
            .front()
            .copied()
            .unwrap_or(InfoCommand::RealTimeRunData)
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, command: InfoCommand) -> Result<(), FleetError> {
        self.queue
            .push_back(command)
            .map_err(|_| FleetError::QueueFull)
    }

    /// Drops the command that was just answered (or given up on).
    pub fn set_queued_cmd_finished(&mut self) {
        self.queue.pop_front();
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    #[must_use]
    pub const fn pending_control(&self) -> Option<ControlRequest> {
        self.pending_control
    }

    /// Replaces any not yet transmitted control request.
    pub fn request_control(&mut self, request: ControlRequest) {
        self.pending_control = Some(request);
    }

    pub fn take_control(&mut self) -> Option<ControlRequest> {
        self.pending_control.take()
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.request, RequestState::Sent(_))
    }

    #[must_use]
    pub fn is_producing(&self, now: u32) -> bool {
        self.record.is_some_and(|record| record.is_producing(now))
    }
}

/// Errors raised by fleet bookkeeping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FleetError {
    SlotOutOfRange,
    SlotEmpty,
    FleetFull,
    QueueFull,
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetError::SlotOutOfRange => f.write_str("slot out of range"),
            FleetError::SlotEmpty => f.write_str("slot not configured"),
            FleetError::FleetFull => f.write_str("all inverter slots in use"),
            FleetError::QueueFull => f.write_str("command queue full"),
        }
    }
}

/// Fixed array of inverter slots. Empty slots are skipped, never removed.
#[derive(Clone, Debug)]
pub struct Fleet<const N: usize = MAX_NUM_INVERTERS> {
    slots: [Option<InverterSlot>; N],
}

impl<const N: usize> Fleet<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Places an inverter in the first free slot.
    pub fn add(&mut self, config: InverterConfig) -> Result<usize, FleetError> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FleetError::FleetFull)?;
        self.slots[index] = Some(InverterSlot::new(config));
        Ok(index)
    }

    /// Places an inverter at a specific slot, replacing what was there.
    pub fn insert(&mut self, index: usize, config: InverterConfig) -> Result<(), FleetError> {
        let slot = self.slots.get_mut(index).ok_or(FleetError::SlotOutOfRange)?;
        *slot = Some(InverterSlot::new(config));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&InverterSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut InverterSlot> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Configured slot or the reason it cannot be used.
    pub fn configured_mut(&mut self, index: usize) -> Result<&mut InverterSlot, FleetError> {
        self.slots
            .get_mut(index)
            .ok_or(FleetError::SlotOutOfRange)?
            .as_mut()
            .ok_or(FleetError::SlotEmpty)
    }

    #[must_use]
    pub fn is_configured(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    #[must_use]
    pub fn configured_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// First configured slot and its index.
    #[must_use]
    pub fn first(&self) -> Option<(usize, &InverterSlot)> {
        self.iter().next()
    }

    /// Iterates configured slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &InverterSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|slot| (index, slot)))
    }
}

impl<const N: usize> Default for Fleet<N> {
    fn default() -> Self {
        Self::new()
    }
}
