//! `PaymentMilestoneReached` event ABI.
//!
//! ```solidity
//! event PaymentMilestoneReached(uint8 paymentPercentage, string windowName);
//! ```
//!
//! Neither parameter is indexed, so both live in the log data:
//!
//! | offset          | content                                     |
//! |-----------------|---------------------------------------------|
//! | `0x00`          | `paymentPercentage`, left-padded to 32 bytes |
//! | `0x20`          | byte offset of `windowName`                  |
//! | offset          | string length                               |
//! | offset + `0x20` | UTF-8 bytes, right-padded                    |

use super::rpc::RawLog;
use crate::events::{InvalidPercentage, MilestoneEvent, Percentage};
use alloy_primitives::{B256, keccak256};
use std::sync::LazyLock;
use thiserror::Error;

pub const PAYMENT_MILESTONE_REACHED: &str = "PaymentMilestoneReached(uint8,string)";

/// topic0 of `PaymentMilestoneReached`.
pub static PAYMENT_MILESTONE_TOPIC: LazyLock<B256> =
    LazyLock::new(|| keccak256(PAYMENT_MILESTONE_REACHED));

const WORD: usize = 32;

/// Why a single log could not be turned into a [`MilestoneEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic,

    #[error("unexpected event topic {0}")]
    TopicMismatch(B256),

    #[error("log data truncated: needed {needed} bytes, got {len}")]
    Truncated { needed: usize, len: usize },

    #[error("paymentPercentage word is not a uint8")]
    NotUint8,

    #[error(transparent)]
    Percentage(#[from] InvalidPercentage),

    #[error("windowName offset or length does not fit")]
    Overflow,

    #[error("windowName is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

fn slice(data: &[u8], start: usize, len: usize) -> Result<&[u8], DecodeError> {
    let end = start.checked_add(len).ok_or(DecodeError::Overflow)?;
    data.get(start..end).ok_or(DecodeError::Truncated {
        needed: end,
        len: data.len(),
    })
}

/// Read a 32-byte word as a `usize`, rejecting anything that does not fit.
fn word_as_usize(word: &[u8]) -> Result<usize, DecodeError> {
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(DecodeError::Overflow);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(bytes)).map_err(|_| DecodeError::Overflow)
}

/// Decode the data section of a `PaymentMilestoneReached` log.
pub fn decode_milestone_data(data: &[u8]) -> Result<MilestoneEvent, DecodeError> {
    let percentage_word = slice(data, 0, WORD)?;
    let (padding, value) = percentage_word.split_at(WORD - 1);
    if padding.iter().any(|b| *b != 0) {
        return Err(DecodeError::NotUint8);
    }
    let payment_percentage = Percentage::new(value[0])?;

    let offset = word_as_usize(slice(data, WORD, WORD)?)?;
    let length = word_as_usize(slice(data, offset, WORD)?)?;
    let start = offset.checked_add(WORD).ok_or(DecodeError::Overflow)?;
    let window_name = std::str::from_utf8(slice(data, start, length)?)?;

    Ok(MilestoneEvent {
        payment_percentage,
        window_name: window_name.into(),
        position: None,
    })
}

/// Decode a full log entry, checking its topic first.
pub fn decode_milestone_log(log: &RawLog) -> Result<MilestoneEvent, DecodeError> {
    let topic = log.topics.first().ok_or(DecodeError::MissingTopic)?;
    if *topic != *PAYMENT_MILESTONE_TOPIC {
        return Err(DecodeError::TopicMismatch(*topic));
    }

    let event = decode_milestone_data(&log.data)?;
    Ok(match log.position() {
        Some(position) => event.at(position),
        None => event,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::LogPosition;
    use alloy_primitives::{Address, Bytes, U64, address, b256};

    /// ABI-encode `(uint8, string)` as log data.
    pub(crate) fn encode_data(percentage: u8, window_name: &str) -> Vec<u8> {
        let mut data = vec![0u8; WORD * 3];
        data[WORD - 1] = percentage;
        data[2 * WORD - 1] = 0x40;
        data[3 * WORD - 8..3 * WORD].copy_from_slice(&(window_name.len() as u64).to_be_bytes());
        data.extend_from_slice(window_name.as_bytes());
        let padded = data.len().div_ceil(WORD) * WORD;
        data.resize(padded, 0);
        data
    }

    const CONTRACT: Address = address!("7c3dc63d5ba4046f57680b24a1362f4052535378");

    pub(crate) fn milestone_log(block: u64, index: u64, percentage: u8, window: &str) -> RawLog {
        RawLog {
            address: CONTRACT,
            topics: vec![*PAYMENT_MILESTONE_TOPIC],
            data: Bytes::from(encode_data(percentage, window)),
            block_number: Some(U64::from(block)),
            log_index: Some(U64::from(index)),
            transaction_hash: Some(B256::left_padding_from(
                &(block * 1000 + index).to_be_bytes(),
            )),
            removed: false,
        }
    }

    #[test]
    fn test_topic_hash() {
        assert_eq!(
            *PAYMENT_MILESTONE_TOPIC,
            keccak256("PaymentMilestoneReached(uint8,string)")
        );
        assert_eq!(
            keccak256("Transfer(address,address,uint256)"),
            b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
    }

    #[test]
    fn test_decode_log() {
        let event = decode_milestone_log(&milestone_log(12, 3, 50, "1stStoryWindows")).unwrap();
        assert_eq!(event.payment_percentage.get(), 50);
        assert_eq!(event.window_name, "1stStoryWindows");
        assert_eq!(
            event.position,
            Some(LogPosition {
                block_number: 12,
                log_index: 3
            })
        );
    }

    #[test]
    fn test_decode_long_window_name() {
        let name = "a-window-name-longer-than-one-abi-word-for-sure";
        let event = decode_milestone_data(&encode_data(7, name)).unwrap();
        assert_eq!(event.window_name, name);
    }

    #[test]
    fn test_rejects_percentage_above_hundred() {
        let err = decode_milestone_data(&encode_data(101, "x")).unwrap_err();
        assert!(matches!(err, DecodeError::Percentage(InvalidPercentage(101))));
    }

    #[test]
    fn test_rejects_non_uint8_word() {
        let mut data = encode_data(5, "x");
        data[WORD - 2] = 1;
        assert!(matches!(
            decode_milestone_data(&data),
            Err(DecodeError::NotUint8)
        ));
    }

    #[test]
    fn test_rejects_truncated_string() {
        let data = encode_data(5, "1stStoryWindows");
        assert!(matches!(
            decode_milestone_data(&data[..WORD * 3 + 4]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            decode_milestone_data(&data[..WORD]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_rejects_huge_offset() {
        let mut data = encode_data(5, "x");
        data[WORD] = 0xff;
        assert!(matches!(
            decode_milestone_data(&data),
            Err(DecodeError::Overflow)
        ));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let mut data = encode_data(5, "ab");
        data[3 * WORD] = 0xff;
        assert!(matches!(
            decode_milestone_data(&data),
            Err(DecodeError::Utf8(_))
        ));
    }

    #[test]
    fn test_rejects_other_topic() {
        let mut log = milestone_log(1, 0, 5, "x");
        log.topics[0] = keccak256("Other(uint8,string)");
        assert!(matches!(
            decode_milestone_log(&log),
            Err(DecodeError::TopicMismatch(_))
        ));

        log.topics.clear();
        assert!(matches!(
            decode_milestone_log(&log),
            Err(DecodeError::MissingTopic)
        ));
    }
}
