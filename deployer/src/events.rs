//! Event extraction from transaction receipts.
//!
//! Logs are matched against the named event's topic-0 signature from the
//! contract ABI and decoded with that event's declared parameters. Log
//! position is never used: coordinator versions emit different numbers of
//! logs per transaction, so "the n-th log" is not a stable address.

use ethers::abi::{Abi, Log as DecodedLog, RawLog, Token};
use ethers::types::{Address, Log, U256};

use crate::error::{DeployError, Result};

/// Decode every log emitted by `emitter` (if given) that matches event `name`.
pub fn decode_all(
    abi: &Abi,
    name: &str,
    emitter: Option<Address>,
    logs: &[Log],
) -> Result<Vec<DecodedLog>> {
    let not_found = || DeployError::EventNotFound {
        event: name.to_string(),
        field: String::new(),
    };
    let event = abi.event(name).map_err(|_| not_found())?;
    let topic0 = event.signature();

    let decoded = logs
        .iter()
        .filter(|log| emitter.is_none_or(|addr| log.address == addr))
        .filter(|log| log.topics.first() == Some(&topic0))
        .filter_map(|log| {
            event
                .parse_log(RawLog {
                    topics: log.topics.clone(),
                    data: log.data.to_vec(),
                })
                .ok()
        })
        .collect();
    Ok(decoded)
}

/// Return the value of `field` in the first `name` event found in `logs`.
pub fn find_param(
    abi: &Abi,
    name: &str,
    field: &str,
    emitter: Option<Address>,
    logs: &[Log],
) -> Result<Token> {
    decode_all(abi, name, emitter, logs)?
        .into_iter()
        .find_map(|log| {
            log.params
                .into_iter()
                .find(|p| p.name == field)
                .map(|p| p.value)
        })
        .ok_or_else(|| DeployError::EventNotFound {
            event: name.to_string(),
            field: field.to_string(),
        })
}

/// [`find_param`] for unsigned integer fields such as subscription and request ids.
pub fn find_uint(
    abi: &Abi,
    name: &str,
    field: &str,
    emitter: Option<Address>,
    logs: &[Log],
) -> Result<U256> {
    find_param(abi, name, field, emitter, logs)?
        .into_uint()
        .ok_or_else(|| DeployError::EventNotFound {
            event: name.to_string(),
            field: field.to_string(),
        })
}

/// [`find_param`] for address fields.
pub fn find_address(
    abi: &Abi,
    name: &str,
    field: &str,
    emitter: Option<Address>,
    logs: &[Log],
) -> Result<Address> {
    find_param(abi, name, field, emitter, logs)?
        .into_address()
        .ok_or_else(|| DeployError::EventNotFound {
            event: name.to_string(),
            field: field.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;
    use ethers::types::{Bytes, H256};
    use ethers::utils::keccak256;

    const COORDINATOR_ABI: &str = r#"[
        {"type":"event","name":"SubscriptionCreated","anonymous":false,"inputs":[
            {"name":"subId","type":"uint64","indexed":true},
            {"name":"owner","type":"address","indexed":false}]},
        {"type":"event","name":"SubscriptionFunded","anonymous":false,"inputs":[
            {"name":"subId","type":"uint64","indexed":true},
            {"name":"oldBalance","type":"uint256","indexed":false},
            {"name":"newBalance","type":"uint256","indexed":false}]}
    ]"#;

    fn abi() -> Abi {
        serde_json::from_str(COORDINATOR_ABI).unwrap()
    }

    fn subscription_created(emitter: Address, sub_id: u64, owner: Address) -> Log {
        Log {
            address: emitter,
            topics: vec![
                H256(keccak256("SubscriptionCreated(uint64,address)")),
                H256::from_low_u64_be(sub_id),
            ],
            data: Bytes::from(encode(&[Token::Address(owner)])),
            ..Default::default()
        }
    }

    fn subscription_funded(emitter: Address, sub_id: u64) -> Log {
        Log {
            address: emitter,
            topics: vec![
                H256(keccak256("SubscriptionFunded(uint64,uint256,uint256)")),
                H256::from_low_u64_be(sub_id),
            ],
            data: Bytes::from(encode(&[
                Token::Uint(U256::zero()),
                Token::Uint(U256::from(10)),
            ])),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_by_event_name_regardless_of_position() {
        let coordinator = Address::repeat_byte(0xcc);
        let owner = Address::repeat_byte(0x01);
        let logs = vec![
            subscription_funded(coordinator, 99),
            Log {
                address: Address::repeat_byte(0xee),
                topics: vec![H256::repeat_byte(0x42)],
                ..Default::default()
            },
            subscription_created(coordinator, 7, owner),
        ];

        let sub_id = find_uint(&abi(), "SubscriptionCreated", "subId", Some(coordinator), &logs)
            .unwrap();
        assert_eq!(sub_id, U256::from(7));

        let found_owner =
            find_address(&abi(), "SubscriptionCreated", "owner", None, &logs).unwrap();
        assert_eq!(found_owner, owner);
    }

    #[test]
    fn ignores_matching_events_from_other_emitters() {
        let logs = vec![subscription_created(Address::repeat_byte(0xdd), 3, Address::zero())];
        let err = find_uint(
            &abi(),
            "SubscriptionCreated",
            "subId",
            Some(Address::repeat_byte(0xcc)),
            &logs,
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::EventNotFound { .. }));
    }

    #[test]
    fn missing_field_is_reported() {
        let logs = vec![subscription_created(Address::zero(), 1, Address::zero())];
        let err = find_uint(&abi(), "SubscriptionCreated", "requestId", None, &logs).unwrap_err();
        assert!(err.to_string().contains("requestId"));
    }

    #[test]
    fn unknown_event_is_reported() {
        let err = decode_all(&abi(), "RandomWordsRequested", None, &[]).unwrap_err();
        assert!(err.to_string().contains("RandomWordsRequested"));
    }

    #[test]
    fn decodes_every_occurrence() {
        let c = Address::repeat_byte(0xcc);
        let logs = vec![
            subscription_created(c, 1, Address::zero()),
            subscription_created(c, 2, Address::zero()),
        ];
        assert_eq!(decode_all(&abi(), "SubscriptionCreated", Some(c), &logs).unwrap().len(), 2);
    }
}
