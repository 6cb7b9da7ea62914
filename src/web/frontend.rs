//! Embedded landing-page demo.
//!
//! The page is compiled into the binary as a string constant. It only wires
//! the prompt box to `/api/optimize` and shows the rendered result.

/// The complete single-page demo HTML.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>PromptGreen Demo</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }
textarea { width: 100%; min-height: 10rem; font: inherit; }
pre { white-space: pre-wrap; background: #f0fdf4; padding: 1rem; border-radius: 6px; }
#totals { color: #6b7280; }
</style>
</head>
<body>
<h1>PromptGreen</h1>
<p>Paste a prompt to see how many tokens and how much CO&#8322; it can save.</p>
<textarea id="prompt" placeholder="Enter your AI prompt..."></textarea>
<p>
  <button id="optimize">Analyze</button>
  <button id="clear">Clear</button>
  <span id="chars">0</span> characters
</p>
<pre id="result"></pre>
<p id="totals"></p>
<script>
const $ = (id) => document.getElementById(id);

async function call(path, opts) {
  const res = await fetch(path, opts);
  return { status: res.status, body: await res.json() };
}

function showTotals(t) {
  if (!t) return;
  $('totals').textContent =
    `${t.optimizations} optimizations, ${t.tokensSaved} tokens saved, ${t.co2Reduced.toFixed(2)}g CO₂ reduced`;
}

$('prompt').addEventListener('input', async () => {
  $('chars').textContent = $('prompt').value.length;
  await call('/api/clear', { method: 'POST' });
  $('result').textContent = '';
});

$('clear').addEventListener('click', async () => {
  $('prompt').value = '';
  $('chars').textContent = '0';
  await call('/api/clear', { method: 'POST' });
  $('result').textContent = '';
});

$('optimize').addEventListener('click', async () => {
  $('optimize').disabled = true;
  $('result').textContent = 'Analyzing your prompt...';
  try {
    const { status, body } = await call('/api/optimize', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ text: $('prompt').value }),
    });
    if (status === 409) return;
    $('result').textContent = status === 200 ? body.rendered : body.error;
    showTotals(body.totals);
  } catch (err) {
    $('result').textContent = `Network error: ${err.message}`;
  } finally {
    $('optimize').disabled = false;
  }
});

call('/api/stats').then(({ body }) => showTotals(body)).catch(() => {});
</script>
</body>
</html>
"##;
