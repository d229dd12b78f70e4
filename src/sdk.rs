//! Browser scripts served by the runtime. The chat widget and the report
//! renderer bind to fixed element ids (`chatbox`, `userInput`, `reportButton`,
//! `rightsContainer`, `sendLead`, `leadName`, `leadPhone`, `leadEmail`);
//! renaming an id in the page markup silently detaches the feature.

pub fn widget_script() -> String {
    r#"// Zakaut chat widget
(function (global) {
  const chatbox = document.getElementById('chatbox');
  const input = document.getElementById('userInput');
  const reportButton = document.getElementById('reportButton');

  let sessionId = null;
  let revealed = false;
  // Blocks input while the report reveal is in flight. The server rejects
  // late messages regardless; this only keeps the transcript tidy.
  let revealing = false;

  const ERROR_TEXT = 'אירעה שגיאה בתקשורת עם השרת.';

  function addMessage(text, sender = 'bot') {
    const div = document.createElement('div');
    div.className = 'message ' + sender;
    div.textContent = text;
    chatbox.appendChild(div);
    chatbox.scrollTop = chatbox.scrollHeight;
  }

  async function postJson(url, body) {
    const res = await fetch(url, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(body),
    });
    return res.json();
  }

  async function startSession() {
    try {
      const data = await postJson('/api/chat/session', {});
      sessionId = data.session_id;
      addMessage(data.reply, 'bot');
    } catch (err) {
      addMessage(ERROR_TEXT, 'bot');
    }
  }

  async function sendMessage() {
    const msg = input.value.trim();
    if (!msg || revealing) return;

    addMessage(msg, 'user');
    input.value = '';

    try {
      const data = await postJson('/api/chat/message', {
        session_id: sessionId,
        message: msg,
      });
      if (data.profile) {
        addMessage('📋 פרופיל נוכחי: ' + JSON.stringify(data.profile), 'bot');
      }
      if (data.report_ready) {
        revealing = true;
        addMessage('🔍 הסוכן שלנו מחשב את הדוח שלך...', 'bot');
        setTimeout(() => {
          addMessage(data.reply, 'bot');
          if (!revealed) {
            reportButton.style.display = 'block';
            revealed = true;
          }
          revealing = false;
        }, data.reveal_delay_ms || 1500);
        return;
      }
      addMessage(data.reply, 'bot');
    } catch (err) {
      addMessage(ERROR_TEXT, 'bot');
    }
  }

  function openReport() {
    global.location.href = '/report?session=' + encodeURIComponent(sessionId || '');
  }

  global.addEventListener('load', startSession);
  input.addEventListener('keypress', (e) => {
    if (e.key === 'Enter') sendMessage();
  });
  reportButton.addEventListener('click', openReport);

  global.ZakautChat = { sendMessage, openReport };
})(window);
"#
    .to_string()
}

pub fn report_script() -> String {
    r#"// Zakaut report checklist + lead form
document.addEventListener('DOMContentLoaded', async () => {
  const container = document.getElementById('rightsContainer');
  const session = new URLSearchParams(window.location.search).get('session') || '';

  let rights = [];
  try {
    const res = await fetch('/api/chat/report/' + encodeURIComponent(session));
    const data = await res.json();
    rights = data.rights || [];
  } catch (err) {
    rights = [];
  }

  rights.forEach((r) => {
    const div = document.createElement('div');
    const checkbox = document.createElement('input');
    checkbox.type = 'checkbox';
    checkbox.style.marginLeft = '0.5rem';
    const label = document.createElement('label');
    label.appendChild(checkbox);
    label.append(' ' + r);
    div.appendChild(label);
    container.appendChild(div);
  });

  document.getElementById('sendLead').addEventListener('click', async () => {
    const lead = {
      session_id: session,
      name: document.getElementById('leadName').value,
      phone: document.getElementById('leadPhone').value,
      email: document.getElementById('leadEmail').value,
    };
    try {
      await fetch('/api/leads', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(lead),
      });
    } catch (err) {
      // Lead capture is best-effort; the acknowledgement shows either way.
    }
    alert('תודה! פרטיך התקבלו.');
  });
});
"#
    .to_string()
}
