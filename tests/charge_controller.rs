use assert_matches::assert_matches;
use renogymodbus_lib::{
    charge_controller::ChargeController,
    client::RetriableClient,
    frame::{self, ExceptionCode},
    protocol::{self, Address},
    retry::RetryPolicy,
    transport::{Transport, TransportError},
    Error, ErrorKind,
};
use std::collections::VecDeque;
use std::num::NonZeroU8;
use std::time::Duration;

/// Replays canned responses and records every request.
#[derive(Default)]
struct Bus {
    responses: VecDeque<Result<Vec<u8>, TransportError>>,
    requests: Vec<Vec<u8>>,
}

impl Bus {
    fn respond(mut self, response: Result<Vec<u8>, TransportError>) -> Self {
        self.responses.push_back(response);
        self
    }

    fn registers(self, words: &[u16]) -> Self {
        let mut response = vec![0x01, 0x03, (words.len() * 2) as u8];
        for word in words {
            response.extend_from_slice(&word.to_be_bytes());
        }
        self.respond(Ok(with_crc(response)))
    }
}

impl Transport for Bus {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.requests.push(request.to_vec());
        self.responses
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout(Duration::ZERO)))
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = frame::crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

fn controller(bus: Bus) -> ChargeController<Bus> {
    let policy = RetryPolicy::new(NonZeroU8::new(3).unwrap(), Duration::ZERO);
    ChargeController::new(RetriableClient::with_policy(bus, Address::default(), policy))
}

fn requests(controller: ChargeController<Bus>) -> Vec<Vec<u8>> {
    controller.into_inner().into_inner().requests
}

#[test]
fn battery_state_of_charge() {
    let mut controller = controller(Bus::default().registers(&[42]));
    assert_eq!(controller.battery_state_of_charge().unwrap(), 42);
    assert_eq!(
        requests(controller),
        [vec![0x01, 0x03, 0x01, 0x00, 0x00, 0x01, 0x85, 0xF6]]
    );
}

#[test]
fn model_is_read_in_one_request() {
    let words: Vec<u16> = b"RNG-CTRL-RVR40  "
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let mut controller = controller(Bus::default().registers(&words));
    assert_eq!(controller.controller_model().unwrap(), "RNG-CTRL-RVR40");
    assert_eq!(
        requests(controller),
        [vec![0x01, 0x03, 0x00, 0x0C, 0x00, 0x08, 0x84, 0x0F]]
    );
}

#[test]
fn temperatures_share_one_register() {
    let mut controller = controller(
        Bus::default()
            .registers(&[0x8519])
            .registers(&[0x8519]),
    );
    assert_eq!(controller.controller_temperature().unwrap(), -5);
    assert_eq!(controller.battery_temperature().unwrap(), 25);
}

#[test]
fn versions_and_serial_number() {
    let mut controller = controller(
        Bus::default()
            .registers(&[0x0001, 0x0203])
            .registers(&[0x1234, 0xABCD]),
    );
    assert_eq!(
        controller.controller_software_version().unwrap(),
        (0x0001, 0x0203)
    );
    assert_eq!(
        controller.controller_serial_number().unwrap(),
        vec![0x12, 0x34, 0xAB, 0xCD]
    );
}

#[test]
fn packed_ratings() {
    let mut controller = controller(
        Bus::default()
            .registers(&[0x0C28])
            .registers(&[0x0C28]),
    );
    assert_eq!(controller.controller_voltage_rating().unwrap(), 12);
    assert_eq!(controller.controller_current_rating().unwrap(), 40);
}

#[test]
fn getter_retries_after_timeout() {
    let bus = Bus::default()
        .respond(Err(TransportError::Timeout(Duration::from_millis(100))))
        .registers(&[130]);
    let mut controller = controller(bus);
    assert_eq!(controller.battery_voltage().unwrap(), 130);

    let requests = requests(controller);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
}

#[test]
fn getter_gives_up_after_max_attempts() {
    let mut controller = controller(Bus::default());
    let error = controller.solar_power().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert_eq!(requests(controller).len(), 3);
}

#[test]
fn device_exception_is_not_retried() {
    let bus = Bus::default().respond(Ok(with_crc(vec![0x01, 0x83, 0x02])));
    let mut controller = controller(bus);
    assert_matches!(
        controller.load_power(),
        Err(Error::DeviceException(ExceptionCode::IllegalDataAddress))
    );
    assert_eq!(requests(controller).len(), 1);
}

#[test]
fn read_field_by_name() {
    let mut controller = controller(Bus::default().registers(&[7]));
    let field = protocol::Field::by_name("controller_uptime").unwrap();
    assert_eq!(controller.read_field(field).unwrap().to_string(), "7");
}
