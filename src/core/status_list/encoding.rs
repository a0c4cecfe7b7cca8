use std::{collections::BTreeMap, io::Read};

use base64::prelude::*;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde_json::{Map, Value as Json};

use super::{StatusListError, StatusListType, StatusPurpose};

/// Widest status value supported, in bits.
pub const MAX_STATUS_SIZE: u32 = 8;

fn inflate<R: Read>(mut decoder: R, what: &str) -> Result<Vec<u8>, StatusListError> {
    let mut bits = Vec::new();
    decoder
        .read_to_end(&mut bits)
        .map_err(|e| StatusListError::Invalid(format!("unable to decompress {what}: {e}")))?;
    Ok(bits)
}

fn credential_subject(payload: &Map<String, Json>) -> Option<&Map<String, Json>> {
    payload
        .get("credentialSubject")
        .or_else(|| payload.get("vc").and_then(|vc| vc.get("credentialSubject")))
        .and_then(Json::as_object)
}

fn encoded_list(payload: &Map<String, Json>) -> Result<&str, StatusListError> {
    credential_subject(payload)
        .and_then(|subject| subject.get("encodedList"))
        .and_then(Json::as_str)
        .ok_or_else(|| StatusListError::Invalid("missing credentialSubject.encodedList".into()))
}

/// Decompress the bitstring carried by a status list token payload.
///
/// ## Returns
/// The raw bits and, for IETF token status lists, the declared bit width.
pub fn decode_list(
    list_type: StatusListType,
    payload: &Map<String, Json>,
) -> Result<(Vec<u8>, Option<u32>), StatusListError> {
    match list_type {
        StatusListType::Ietf => {
            let list = payload
                .get("status_list")
                .and_then(Json::as_object)
                .ok_or_else(|| StatusListError::Invalid("missing status_list claim".into()))?;
            let size = list
                .get("bits")
                .and_then(Json::as_u64)
                .and_then(|bits| u32::try_from(bits).ok())
                .ok_or_else(|| StatusListError::Invalid("missing status_list.bits".into()))?;
            let lst = list
                .get("lst")
                .and_then(Json::as_str)
                .ok_or_else(|| StatusListError::Invalid("missing status_list.lst".into()))?;
            let compressed = BASE64_URL_SAFE_NO_PAD
                .decode(lst.trim_end_matches('='))
                .map_err(|e| StatusListError::Invalid(format!("lst is not base64url: {e}")))?;
            let bits = inflate(ZlibDecoder::new(compressed.as_slice()), "status_list.lst")?;
            Ok((bits, Some(size)))
        }
        StatusListType::Bitstring => {
            let (_, compressed) = multibase::decode(encoded_list(payload)?)
                .map_err(|e| StatusListError::Invalid(format!("encodedList is not multibase: {e}")))?;
            let bits = inflate(GzDecoder::new(compressed.as_slice()), "encodedList")?;
            Ok((bits, None))
        }
        StatusListType::StatusList => {
            let encoded = encoded_list(payload)?.trim_end_matches('=');
            let compressed = BASE64_URL_SAFE_NO_PAD
                .decode(encoded)
                .or_else(|_| BASE64_STANDARD_NO_PAD.decode(encoded))
                .map_err(|e| StatusListError::Invalid(format!("encodedList is not base64: {e}")))?;
            let bits = inflate(GzDecoder::new(compressed.as_slice()), "encodedList")?;
            Ok((bits, None))
        }
    }
}

/// Read the `size` bit wide value at `index`. Bits are numbered from the most significant bit of
/// the first byte.
pub fn read_status(bits: &[u8], index: u64, size: u32) -> Result<u64, StatusListError> {
    if size == 0 || size > MAX_STATUS_SIZE {
        return Err(StatusListError::Invalid(format!(
            "unsupported status size {size}"
        )));
    }
    let length = bits.len() as u64 * 8;
    let (start, end) = index
        .checked_mul(u64::from(size))
        .and_then(|start| Some((start, start.checked_add(u64::from(size))?)))
        .filter(|(_, end)| *end <= length)
        .ok_or(StatusListError::IndexOutOfRange { index, length })?;

    Ok((start..end).fold(0, |value, position| {
        let byte = bits[(position / 8) as usize];
        let bit = (byte >> (7 - position % 8)) & 1;
        (value << 1) | u64::from(bit)
    }))
}

/// The message for every possible status value.
///
/// Single bit lists are named after their purpose. Wider lists name each value by its number,
/// except IETF token status lists which use the registered `VALID`, `INVALID` and `SUSPENDED`
/// values.
pub fn default_messages(
    list_type: StatusListType,
    purpose: StatusPurpose,
    size: u32,
) -> BTreeMap<u64, String> {
    let pair = |zero: &str, one: &str| BTreeMap::from([(0, zero.to_owned()), (1, one.to_owned())]);
    if size == 1 {
        return match purpose {
            StatusPurpose::Revocation => pair("unrevoked", "revoked"),
            StatusPurpose::Suspension => pair("unsuspended", "suspended"),
            StatusPurpose::Message | StatusPurpose::Other => pair("unset", "set"),
        };
    }

    let mut messages: BTreeMap<u64, String> = (0..1u64 << size.min(MAX_STATUS_SIZE))
        .map(|value| (value, value.to_string()))
        .collect();
    if list_type == StatusListType::Ietf {
        messages.insert(0, "valid".to_owned());
        messages.insert(1, "revoked".to_owned());
        messages.insert(2, "suspended".to_owned());
    }
    messages
}

/// Parse the `statusMessage` array of a bitstring entry into a value table.
pub fn entry_messages(entry: &Map<String, Json>) -> Option<BTreeMap<u64, String>> {
    let messages = entry.get("statusMessage")?.as_array()?;
    let table: BTreeMap<u64, String> = messages
        .iter()
        .filter_map(|message| {
            let status = message.get("status")?.as_str()?;
            let value = u64::from_str_radix(status.trim_start_matches("0x"), 16).ok()?;
            let text = message.get("message")?.as_str()?;
            Some((value, text.to_owned()))
        })
        .collect();
    Some(table).filter(|table| !table.is_empty())
}
