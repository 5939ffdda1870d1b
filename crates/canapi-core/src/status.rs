//! Status and property accessors: sticky status, bus-load, bit-rate,
//! key/value properties, channel binding and version strings.

use serde::Serialize;

use crate::adapter::param;
use crate::error::{CanError, CanResult};
use crate::table::ChannelTable;
use crate::types::{Board, BoardParams, CanStatus, Handle, OpMode};
use canapi_btr::Bitrate;

/// Bus-load reading. The adapter exposes no load figure, so a running
/// channel reports 0 and a stopped one reports none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusLoad {
    /// Percent, 0–100.
    pub load: Option<u8>,
    pub status: CanStatus,
}

/// What a slot is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub board: Board,
    #[serde(serialize_with = "mode_bits")]
    pub mode: OpMode,
    pub params: BoardParams,
}

fn mode_bits<S: serde::Serializer>(mode: &OpMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(mode.bits())
}

impl ChannelTable {
    /// Sticky status. A running channel re-polls the adapter first.
    pub async fn status(&self, handle: Handle) -> CanResult<CanStatus> {
        let channel = self.channel(handle).await?;
        let mut ch = channel.lock().await;
        if ch.is_running() {
            let bus = self.adapter.bus_status(ch.board).await?;
            ch.status.merge(bus);
        }
        Ok(ch.status)
    }

    pub async fn bus_load(&self, handle: Handle) -> CanResult<BusLoad> {
        let status = self.status(handle).await?;
        Ok(BusLoad {
            load: (!status.can_stopped).then_some(0),
            status,
        })
    }

    /// Bit-rate of the last start; only meaningful while running.
    pub async fn bitrate(&self, handle: Handle) -> CanResult<(Option<Bitrate>, CanStatus)> {
        let channel = self.channel(handle).await?;
        let ch = channel.lock().await;
        let bitrate = if ch.is_running() { ch.bitrate } else { None };
        Ok((bitrate, ch.status))
    }

    /// Read an adapter parameter, truncated to at most `max_len` bytes.
    pub async fn get_property(&self, handle: Handle, id: u8, max_len: usize) -> CanResult<Vec<u8>> {
        if max_len == 0 {
            return Err(CanError::NullParameter);
        }
        let board = self.board(handle).await?;
        let mut value = self.adapter.get_value(board, id).await?;
        value.truncate(max_len);
        Ok(value)
    }

    /// Write an adapter parameter.
    pub async fn set_property(&self, handle: Handle, id: u8, value: &[u8]) -> CanResult<()> {
        if value.is_empty() {
            return Err(CanError::NullParameter);
        }
        let board = self.board(handle).await?;
        self.adapter.set_value(board, id, value).await?;
        Ok(())
    }

    pub async fn interface(&self, handle: Handle) -> CanResult<ChannelInfo> {
        let channel = self.channel(handle).await?;
        let ch = channel.lock().await;
        Ok(ChannelInfo {
            board: ch.board,
            mode: ch.mode,
            params: ch.params,
        })
    }

    /// Channel version string up to the first line break, with the device
    /// number appended for USB boards.
    pub async fn hardware_version(&self, handle: Handle) -> CanResult<String> {
        let board = self.board(handle).await?;
        let raw = self.adapter.get_value(board, param::CHANNEL_VERSION).await?;
        let text = c_string(&raw);
        let mut version = text.lines().next().unwrap_or_default().to_string();

        if board.is_usb() {
            let raw = self.adapter.get_value(board, param::DEVICE_NUMBER).await?;
            let device = dword(&raw);
            version.push_str(&format!(" (Device {device:02X}h)"));
        }
        Ok(version)
    }

    /// Adapter API version.
    pub async fn firmware_version(&self) -> CanResult<String> {
        let raw = self.adapter.get_value(Board::NONE, param::API_VERSION).await?;
        Ok(format!("PCAN-Basic API {}", c_string(&raw)))
    }

    async fn board(&self, handle: Handle) -> CanResult<Board> {
        Ok(self.slot(handle).await?.board)
    }
}

/// Little-endian 32-bit value; shorter buffers are zero-extended.
fn dword(raw: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    let len = raw.len().min(word.len());
    word[..len].copy_from_slice(&raw[..len]);
    u32::from_le_bytes(word)
}

/// Text up to the first NUL.
fn c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
