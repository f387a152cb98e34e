//! Content-side bootstrap.
//!
//! The host injects this script into content it trusts to call back. It
//! installs `window.AppBridge` with `send`, `call`, `on`, `once`, `off`,
//! `waitFor` and `isApp`, stamps every frame with the live token, a fresh
//! nonce and the current time, and turns `bridgeResponse` events into
//! resolved/rejected promises.

use crate::{config::BridgeConfig, message::RESPONSE_ACTION};

const TEMPLATE: &str = r#"(function () {
  if (window.AppBridge && window.AppBridge.__installed) { return; }
  var TOKEN = __TOKEN__, INBOUND = __INBOUND__, EVENT = __EVENT__;
  var RESPONSE = __RESPONSE__, DEFAULT_TIMEOUT = __TIMEOUT__;
  var listeners = {}, pending = {}, seq = 0;
  function nonce() {
    if (window.crypto && window.crypto.randomUUID) { return window.crypto.randomUUID(); }
    seq += 1;
    return Date.now().toString(36) + "-" + seq + "-" + Math.random().toString(36).slice(2);
  }
  function post(action, payload, requestId) {
    var frame = { protocol: INBOUND + action, payload: payload, timestamp: Date.now(), __token: TOKEN, __nonce: nonce() };
    if (requestId) { frame.requestId = requestId; }
    __POST__(JSON.stringify(frame));
  }
  function off(action, cb) {
    var list = listeners[action];
    if (!list) { return; }
    listeners[action] = cb ? list.filter(function (l) { return l.cb !== cb; }) : [];
  }
  function on(action, cb, once) {
    (listeners[action] = listeners[action] || []).push({ cb: cb, once: !!once });
    return function () { off(action, cb); };
  }
  window.addEventListener(EVENT, function (event) {
    var frame = event.detail || {};
    var payload = frame.payload;
    if (frame.action === RESPONSE && payload && pending[payload.requestId]) {
      var entry = pending[payload.requestId];
      delete pending[payload.requestId];
      clearTimeout(entry.timer);
      if (payload.success) { entry.resolve(payload.data); } else { entry.reject(new Error(payload.error || "request failed")); }
      return;
    }
    (listeners[frame.action] || []).slice().forEach(function (l) {
      if (l.once) { off(frame.action, l.cb); }
      var result;
      try { result = l.cb(payload && payload.requestId ? payload.data : payload, frame); }
      catch (e) { result = Promise.reject(e); }
      if (payload && payload.requestId) {
        Promise.resolve(result).then(
          function (data) { post(RESPONSE, { requestId: payload.requestId, success: true, data: data }); },
          function (e) { post(RESPONSE, { requestId: payload.requestId, success: false, error: String(e && e.message || e) }); });
      }
    });
  });
  window.AppBridge = {
    __installed: true,
    isApp: function () { return true; },
    send: function (action, payload) { post(action, payload); },
    call: function (action, payload, timeoutMs) {
      return new Promise(function (resolve, reject) {
        var id = nonce();
        var timer = setTimeout(function () {
          delete pending[id];
          reject(new Error("call " + action + " timed out"));
        }, timeoutMs || DEFAULT_TIMEOUT);
        pending[id] = { resolve: resolve, reject: reject, timer: timer };
        post(action, payload, id);
      });
    },
    on: function (action, cb) { return on(action, cb, false); },
    once: function (action, cb) { return on(action, cb, true); },
    off: off,
    waitFor: function (action, timeoutMs) {
      return new Promise(function (resolve, reject) {
        var timer = null;
        var handler = function (payload) { if (timer) { clearTimeout(timer); } resolve(payload); };
        on(action, handler, true);
        if (timeoutMs) {
          timer = setTimeout(function () { off(action, handler); reject(new Error("waitFor " + action + " timed out")); }, timeoutMs);
        }
      });
    }
  };
})();"#;

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Render the bootstrap with `token` and the configured schemes embedded.
pub fn bootstrap_script(config: &BridgeConfig, token: &str) -> String {
    TEMPLATE
        .replace("__TOKEN__", &js_string(token))
        .replace("__INBOUND__", &js_string(&config.inbound_scheme))
        .replace("__EVENT__", &js_string(&config.client_event))
        .replace("__RESPONSE__", &js_string(RESPONSE_ACTION))
        .replace("__TIMEOUT__", &config.default_call_timeout_ms.to_string())
        .replace("__POST__", &config.post_function)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_placeholders_are_filled() {
        let js = bootstrap_script(&BridgeConfig::default(), "abc123");
        assert!(!js.contains("__TOKEN__"));
        assert!(!js.contains("__POST__"));
        assert!(js.contains(r#"var TOKEN = "abc123""#));
        assert!(js.contains("window.ipc.postMessage(JSON.stringify(frame))"));
        assert!(js.contains(r#"INBOUND = "app://""#));
    }

    #[test]
    fn token_is_quoted_as_a_js_string() {
        let js = bootstrap_script(&BridgeConfig::default(), "a\"b");
        assert!(js.contains(r#"var TOKEN = "a\"b""#));
    }
}
