use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use u2fkey::u2f::verify;
use u2fkey::up::AbsentFor;
use u2fkey::{
    AdapterOptions, ApplicationParameter, DeviceSelector, Error, KeyAdapter, KeyHandle,
    RetryPolicy, SoftTokenOpener, TokenOpener, TokenTransport, TransportError,
};

fn fast() -> AdapterOptions {
    AdapterOptions::new(RetryPolicy::default().with_interval(Duration::from_millis(1)))
}

/// Transport that plays back a fixed script of failures before delegating to
/// a software token.
struct Scripted {
    inner: u2fkey::SoftToken,
    failures: Arc<Mutex<Vec<TransportError>>>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn next_failure(&self) -> Option<TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures.lock().unwrap().pop()
    }
}

impl TokenTransport for Scripted {
    fn register(
        &mut self,
        challenge: &[u8; 32],
        application: &ApplicationParameter,
    ) -> Result<Vec<u8>, TransportError> {
        match self.next_failure() {
            Some(e) => Err(e),
            None => self.inner.register(challenge, application),
        }
    }

    fn authenticate(
        &mut self,
        challenge: &[u8; 32],
        application: &ApplicationParameter,
        key_handle: &KeyHandle,
    ) -> Result<Vec<u8>, TransportError> {
        match self.next_failure() {
            Some(e) => Err(e),
            None => self.inner.authenticate(challenge, application, key_handle),
        }
    }
}

struct ScriptedOpener {
    soft: SoftTokenOpener,
    failures: Arc<Mutex<Vec<TransportError>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    fn new() -> Self {
        Self {
            soft: SoftTokenOpener::ephemeral(Arc::new(u2fkey::up::AlwaysPresent)),
            failures: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Queue `n` presence-required answers followed by `then`, if any.
    fn script(&self, n: usize, then: Option<TransportError>) {
        let mut failures = self.failures.lock().unwrap();
        failures.clear();
        failures.extend(then);
        failures.extend((0..n).map(|_| TransportError::PresenceRequired));
        self.calls.store(0, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenOpener for ScriptedOpener {
    type Token = Scripted;

    fn open(&self, device: &DeviceSelector) -> Result<Scripted, TransportError> {
        Ok(Scripted {
            inner: self.soft.open(device)?,
            failures: Arc::clone(&self.failures),
            calls: Arc::clone(&self.calls),
        })
    }
}

#[test]
fn test_generate_succeeds_after_n_retries() {
    for n in [0, 1, 5] {
        let opener = ScriptedOpener::new();
        opener.script(n, None);
        let adapter =
            KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", fast()).unwrap();
        assert_eq!(opener.calls(), n + 1);

        let digest = [0x44u8; 32];
        let response = adapter.sign(&digest).unwrap();
        assert!(verify(adapter.public_key(), &digest, &response));
    }
}

#[test]
fn test_sign_succeeds_after_n_retries() {
    let opener = ScriptedOpener::new();
    opener.script(0, None);
    let adapter =
        KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", fast()).unwrap();

    opener.script(3, None);
    let digest = [0x45u8; 32];
    let response = adapter.sign(&digest).unwrap();
    assert_eq!(opener.calls(), 4);
    assert!(verify(adapter.public_key(), &digest, &response));
}

#[test]
fn test_other_error_stops_retrying() {
    let opener = ScriptedOpener::new();
    opener.script(2, Some(TransportError::Other("device unplugged".into())));
    let result = KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", fast());
    assert!(matches!(result, Err(Error::Transport(TransportError::Other(_)))));
    assert_eq!(opener.calls(), 3);
}

#[test]
fn test_deadline_reports_timeout() {
    let opener = ScriptedOpener::new();
    opener.script(10_000, None);
    let options = AdapterOptions::new(
        RetryPolicy::default()
            .with_interval(Duration::from_millis(5))
            .with_deadline(Duration::from_millis(50)),
    );
    let result = KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", options);
    assert!(matches!(result, Err(Error::PresenceTimeout(_))));
    assert!(opener.calls() < 10_000);
}

#[test]
fn test_cancel_from_another_thread() {
    let opener = ScriptedOpener::new();
    opener.script(0, None);
    let adapter = Arc::new(
        KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", fast()).unwrap(),
    );

    opener.script(100_000, None);
    let cancel = adapter.cancel_flag();
    let signer = Arc::clone(&adapter);
    let handle = std::thread::spawn(move || signer.sign(&[0u8; 32]));

    std::thread::sleep(Duration::from_millis(20));
    cancel.cancel();
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn test_soft_token_waits_for_touch() {
    let presence = Arc::new(AbsentFor::new(4));
    let opener = SoftTokenOpener::ephemeral(presence.clone());
    let adapter =
        KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", fast()).unwrap();
    assert_eq!(presence.remaining(), 0);

    let digest = [0x46u8; 32];
    let response = adapter.sign(&digest).unwrap();
    assert!(verify(adapter.public_key(), &digest, &response));
}

#[test]
fn test_sign_works_again_after_cancel() {
    let opener = SoftTokenOpener::ephemeral(Arc::new(u2fkey::up::AlwaysPresent));
    let adapter =
        KeyAdapter::generate(&opener, &DeviceSelector::First, "example.com", fast()).unwrap();

    adapter.cancel_flag().cancel();
    assert!(matches!(adapter.sign(&[0u8; 32]), Err(Error::Cancelled)));

    let digest = [0x47u8; 32];
    let response = adapter.sign(&digest).unwrap();
    assert!(verify(adapter.public_key(), &digest, &response));
}
