//! Generated client code: the dev bootstraps for the extension and the
//! userscript, and the isolated-world connector.
//!
//! Every cross-world message carries the build id; handlers compare it before
//! doing anything, so messages from a previous build (or another extension)
//! are ignored.

use crate::config::ServerConfig;
use crate::template::{render, JsArg};

pub const DEV_CONTENT_SCRIPT_FILE: &str = "crxm-development.js";
pub const ISOLATED_CONNECTOR_FILE: &str = "crxm-isolated-connector.js";
pub const DEV_USERJS_FILE: &str = "dev.user.js";

/// `window.__CRX_CONTENT_BUILD_ID = '<id>';`
pub fn build_id_prefix(build_id: &str) -> String {
    format!("window.__CRX_CONTENT_BUILD_ID = '{build_id}';\n")
}

const SW_BOOTSTRAP: &str = r#"(function (host, port) {
  const connect = () => {
    const websocket = new WebSocket(`ws://${host}:${port}`);
    websocket.addEventListener('message', ({ data }) => {
      let message;
      try {
        message = JSON.parse(data);
      } catch (_) {
        return;
      }
      if (message.type !== 'reload' || !message.content) return;
      const token = message.content.reloadType;
      if (token === 'RELOAD_SW' || token === 'ALL') {
        chrome.runtime.reload();
      }
    });
    websocket.addEventListener('close', () => setTimeout(connect, 1000));
  };
  connect();
})({{host}}, {{port}});
"#;

/// Service worker code preceded by the reload bootstrap.
pub fn dev_service_worker(server: &ServerConfig, code: &str) -> String {
    let bootstrap = render(
        SW_BOOTSTRAP,
        &[
            ("host", JsArg::str(server.host.as_str())),
            ("port", JsArg::from(server.websocket)),
        ],
    );
    format!("{bootstrap}\n{code}")
}

const DEV_CONTENT_SCRIPT: &str = r#"(function (crxContentBuildId, host, port) {
  const websocket = new WebSocket(`ws://${host}:${port}`);

  websocket.addEventListener('open', () => {
    console.log('[crxm] A reload server connected..');
  });

  websocket.addEventListener('close', () => {
    console.log('[crxm] A reload server disconnected..');
  });

  websocket.addEventListener('message', ({ data }) => {
    let response;
    try {
      response = JSON.parse(data);
    } catch (_) {
      return;
    }
    if (response.type !== 'reload' || !response.content) return;
    switch (response.content.reloadType) {
      case 'RELOAD_CSS':
      case 'RELOAD_CONTENT_SCRIPT':
        location.reload();
        break;
      default:
        break;
    }
  });

  const forward = (type, contents) => {
    if (websocket.readyState !== WebSocket.OPEN) return;
    websocket.send(JSON.stringify({ type: 'console', content: { type, contents } }));
  };

  const handlers = {
    'console-log': (detail) => forward('log', detail),
    'console-warn': (detail) => forward('warn', detail),
    'console-error': (detail) => forward('error', detail),
  };

  window.addEventListener('message', (e) => {
    const data = e.data;
    if (!data || data.crxContentBuildId !== crxContentBuildId) return;
    if (!Object.prototype.hasOwnProperty.call(handlers, data.type)) return;
    handlers[data.type](data.detail);
  });
})({{build_id}}, {{host}}, {{port}});
"#;

/// `crxm-development.js`: live reload plus the console bridge.
pub fn dev_content_script(build_id: &str, server: &ServerConfig) -> String {
    render(
        DEV_CONTENT_SCRIPT,
        &[
            ("build_id", JsArg::str(build_id)),
            ("host", JsArg::str(server.host.as_str())),
            ("port", JsArg::from(server.websocket)),
        ],
    )
}

const ISOLATED_CONNECTOR: &str = r#"(function (crxContentBuildId, config) {
  const messageListeners = {};
  const responseEventName = 'crx-isolated-connector-result';

  window.addEventListener('message', (e) => {
    const { data, target } = e;
    if (!data || data.crxContentBuildId !== crxContentBuildId) return;

    const dispatch = (type, detail) => {
      if (target === null) return;
      target.dispatchEvent(
        new CustomEvent(responseEventName, {
          detail: { type, data: detail, actionId: data.actionId },
        }),
      );
    };

    const handlers = {
      'get-id': () => {
        dispatch('get-id', chrome.runtime.id);
      },
      'get-conf': () => {
        dispatch('get-conf', config);
      },
      'on-message': () => {
        const handleMessage = (request, sender) => {
          dispatch('on-message', { request, sender });
        };
        messageListeners[data.actionId] = handleMessage;
        chrome.runtime.onMessage.addListener(handleMessage);
      },
      'remove-on-message': () => {
        const listener = messageListeners[data.actionId];
        if (listener !== undefined) {
          chrome.runtime.onMessage.removeListener(listener);
          delete messageListeners[data.actionId];
        }
      },
      'send-message': () => {
        const detail = data.detail || {};
        chrome.runtime.sendMessage(detail.message, detail.options, (response) => {
          dispatch('send-message', { response });
        });
      },
    };

    if (!Object.prototype.hasOwnProperty.call(handlers, data.type)) return;
    handlers[data.type]();
  });
})({{build_id}}, {{config}});
"#;

/// `crxm-isolated-connector.js`. `config_json` is handed to `get-conf`
/// requests as a string.
pub fn isolated_connector(build_id: &str, config_json: &str) -> String {
    render(
        ISOLATED_CONNECTOR,
        &[
            ("build_id", JsArg::str(build_id)),
            ("config", JsArg::str(config_json)),
        ],
    )
}

const USERJS_LOADER: &str = r#"(function (host, port, websocketPort, disableSock, trusted) {
  const crxm_window = typeof unsafeWindow !== 'undefined' ? unsafeWindow : window;
  const reloadTokens = ['RELOAD_CONTENT_SCRIPT', 'RELOAD_CSS', 'ALL'];

  const fetchCode = () =>
    new Promise((resolve, reject) => {
      GM_xmlhttpRequest({
        method: 'GET',
        url: `http://${host}:${port}/userscript`,
        onload: (e) => resolve(e.responseText),
        onerror: reject,
      });
    });

  const inject = (code) => {
    const doc = crxm_window.document;
    const script = doc.createElement('script');
    const tt = crxm_window.trustedTypes;
    if (trusted && tt && typeof tt.createPolicy === 'function') {
      const policy = tt.createPolicy('crxm-dev-loader-policy', { createScript: (input) => input });
      script.text = policy.createScript(code);
    } else {
      script.textContent = code;
    }
    (doc.head || doc.documentElement).appendChild(script);

    // the native event is gone by now; replay it for document_end/idle code
    if (doc.readyState !== 'loading') {
      doc.dispatchEvent(new Event('crxm_DOMContentLoaded'));
    }
  };

  const watchSocket = () => {
    const websocket = new WebSocket(`ws://${host}:${websocketPort}`);
    websocket.addEventListener('message', ({ data }) => {
      let message;
      try {
        message = JSON.parse(data);
      } catch (_) {
        return;
      }
      if (message.type === 'reload' && message.content && reloadTokens.includes(message.content.reloadType)) {
        location.reload();
      }
    });
  };

  const watchPolling = (initial) => {
    setInterval(() => {
      fetchCode().then((code) => {
        if (code !== initial) location.reload();
      });
    }, 1000);
  };

  fetchCode().then((code) => {
    if (typeof code !== 'string') return;
    inject(code);
    if (disableSock) {
      watchPolling(code);
    } else {
      watchSocket();
    }
  });
})({{host}}, {{port}}, {{websocket}}, {{disable_sock}}, {{trusted}});
"#;

/// Body of `dev.user.js`, appended after its header.
pub fn dev_userjs_loader(server: &ServerConfig, trusted: bool) -> String {
    render(
        USERJS_LOADER,
        &[
            ("host", JsArg::str(server.host.as_str())),
            ("port", JsArg::from(server.port)),
            ("websocket", JsArg::from(server.websocket)),
            ("disable_sock", JsArg::from(server.disable_sock_in_userjs)),
            ("trusted", JsArg::from(trusted)),
        ],
    )
}
